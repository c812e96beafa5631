//! Login handshake against the modem web UI.
//!
//! The modem guards its status pages behind a form login. The login page
//! carries a hidden anti-forgery `webToken` that has to be echoed back with
//! the credentials; the server answers with a session cookie.

use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use crate::config::ModemConfig;
use crate::error::Result;

/// An authenticated HTTP context, valid for a single scrape cycle.
///
/// The underlying client owns the cookie store holding the session cookie.
/// A session is never reused across cycles.
#[derive(Debug)]
pub struct Session {
    client: Client,
}

impl Session {
    /// The cookie-carrying client.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// Extract the `webToken` value from the login page.
pub fn extract_web_token(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("input[name=webToken]").ok()?;

    document
        .select(&selector)
        .next()
        .and_then(|input| input.value().attr("value"))
        .map(str::to_string)
}

/// Log in to the modem and return a session.
///
/// Login success is not verified: the modem answers the POST the same way for
/// good and bad credentials. A failed login shows up as an empty status page.
pub async fn authenticate(modem: &ModemConfig) -> Result<Session> {
    let client = Client::builder().cookie_store(true).build()?;

    let login_url = modem.endpoint(&modem.login_path);
    debug!(url = %login_url, "Fetching login page");
    let page = client.get(&login_url).send().await?.text().await?;

    let web_token = match extract_web_token(&page) {
        Some(token) => token,
        None => {
            warn!("Login page has no webToken field, continuing with an empty token");
            String::new()
        }
    };

    let action_url = modem.endpoint(&modem.login_action);
    debug!(url = %action_url, user = %modem.username, "Submitting credentials");
    let response = client
        .post(&action_url)
        .form(&[
            ("webToken", web_token.as_str()),
            ("loginUsername", modem.username.as_str()),
            ("loginPassword", modem.password.as_str()),
        ])
        .send()
        .await?;

    let status = response.status();
    // Drain the body so the connection goes back to the pool.
    response.bytes().await?;
    debug!(%status, "Login form submitted");

    Ok(Session { client })
}
