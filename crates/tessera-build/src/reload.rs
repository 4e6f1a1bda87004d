//! Live reload notifications sent after a rebuild.

/// Receiver of reload notifications, usually connected browsers.
pub trait LiveReload: Send + Sync {
    /// Reload every page.
    fn force_refresh(&self);

    /// A single published file changed (path relative to the publish root).
    fn refresh_path(&self, path: &str);

    /// Send clients to `path` on the dev server listening on `port`.
    fn navigate_to(&self, path: &str, port: u16);
}

/// Discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReload;

impl LiveReload for NoReload {
    fn force_refresh(&self) {}

    fn refresh_path(&self, _path: &str) {}

    fn navigate_to(&self, _path: &str, _port: u16) {}
}

/// Route the dev server serves the client script on.
pub const CLIENT_SCRIPT_PATH: &str = "/__livereload.js";

/// Websocket route clients connect to.
pub const SOCKET_PATH: &str = "/__livereload";

/// Tag injected into HTML pages so they connect back to the dev server on `port`.
pub fn script_tag(port: u16) -> String {
    format!(r#"<script src="{CLIENT_SCRIPT_PATH}?port={port}" data-no-instant defer></script>"#)
}

/// Insert `script` before `</body>`, or append it when there is none.
pub fn inject_script(html: &str, script: &str) -> String {
    match html.rfind("</body>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + script.len());
            out.push_str(&html[..pos]);
            out.push_str(script);
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{html}{script}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injects_before_body_end() {
        let html = "<html><body><p>x</p></body></html>";

        let out = inject_script(html, "<script></script>");

        assert_eq!(out, "<html><body><p>x</p><script></script></body></html>");
    }

    #[test]
    fn appends_without_body() {
        assert_eq!(inject_script("<p>x</p>", "<s/>"), "<p>x</p><s/>");
    }

    #[test]
    fn script_tag_carries_port() {
        assert_eq!(
            script_tag(1313),
            r#"<script src="/__livereload.js?port=1313" data-no-instant defer></script>"#
        );
    }
}
