//! WebSocket-based live reload.

use serde::{Deserialize, Serialize};
use tessera_build::reload::SOCKET_PATH;
use tessera_build::LiveReload;
use tokio::sync::broadcast;

/// Messages sent to connected browsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadMessage {
    /// Connection established
    Hello,

    /// Full page reload
    Reload,

    /// A single published file changed; stylesheets are swapped in place
    RefreshPath { path: String },

    /// Go to the page built from the changed file
    Navigate { path: String, port: u16 },
}

/// Hub for broadcasting reload messages to all connected clients.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    sender: broadcast::Sender<ReloadMessage>,
}

impl ReloadHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Send a message to all connected clients.
    pub fn send(&self, msg: ReloadMessage) {
        // No receivers just means no browser is open
        let sent = self.sender.send(msg).unwrap_or(0);
        tracing::debug!("Live reload message sent to {} client(s)", sent);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveReload for ReloadHub {
    fn force_refresh(&self) {
        self.send(ReloadMessage::Reload);
    }

    fn refresh_path(&self, path: &str) {
        self.send(ReloadMessage::RefreshPath {
            path: path.to_string(),
        });
    }

    fn navigate_to(&self, path: &str, port: u16) {
        self.send(ReloadMessage::Navigate {
            path: path.to_string(),
            port,
        });
    }
}

/// Generate the client-side live reload script.
///
/// The server port comes from the `port` query parameter of the script URL, so
/// pages keep working when opened through another host name.
pub fn client_script() -> String {
    format!(
        r#"
(function() {{
  'use strict';

  const src = document.currentScript ? document.currentScript.src : '';
  const port = new URL(src || location.href).searchParams.get('port') || location.port;
  const url = (location.protocol === 'https:' ? 'wss://' : 'ws://') +
    location.hostname + (port ? ':' + port : '') + '{socket}';
  let reconnectAttempts = 0;
  const maxReconnectAttempts = 10;

  function refreshStylesheet(path) {{
    let found = false;
    document.querySelectorAll('link[rel="stylesheet"]').forEach(function(link) {{
      const href = new URL(link.href);
      if (href.pathname === path) {{
        href.searchParams.set('livereload', Date.now());
        link.href = href.toString();
        found = true;
      }}
    }});
    return found;
  }}

  function connect() {{
    const ws = new WebSocket(url);

    ws.onopen = function() {{
      console.log('[livereload] Connected');
      reconnectAttempts = 0;
    }};

    ws.onmessage = function(event) {{
      const msg = JSON.parse(event.data);

      switch (msg.type) {{
        case 'reload':
          location.reload();
          break;

        case 'refresh_path':
          if (!(msg.path.endsWith('.css') && refreshStylesheet(msg.path))) {{
            location.reload();
          }}
          break;

        case 'navigate':
          if (String(msg.port) === (location.port || port) && msg.path !== location.pathname) {{
            location.href = msg.path;
          }} else {{
            location.reload();
          }}
          break;

        case 'hello':
          break;
      }}
    }};

    ws.onclose = function() {{
      if (reconnectAttempts < maxReconnectAttempts) {{
        reconnectAttempts++;
        setTimeout(connect, 1000 * reconnectAttempts);
      }}
    }};
  }}

  connect();
}})();
"#,
        socket = SOCKET_PATH
    )
}
