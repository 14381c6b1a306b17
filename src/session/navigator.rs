use tracing::info;
use url::Url;

/// Performs the navigation the identity flow asks for (login page, logout page).
///
/// A browser host would change the location; a terminal host prints the URL.
pub trait Navigator: Send + Sync {
    fn navigate(&self, url: &Url);
}

/// Navigator that only records the target in the log.
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, url: &Url) {
        info!(target_url = %url, "Navigation requested");
    }
}
