/// Outbound notifications — the engine's only way of talking to chat.
///
/// The engine calls `NotificationSink::send` and never waits on delivery.
/// `WebhookSink` queues the message for a dedicated writer thread that does
/// the HTTP POST (ureq is blocking, so it stays off the producers' threads).
/// Callers hold a cheap handle; a full queue or a dead writer surfaces as a
/// `SinkError` that the engine logs and drops.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Main chat channel (joins, leaves, chat relay).
    General,
    /// Mob/kill feed channel; farming notices and summaries land here.
    SecondaryFeed,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::General       => f.write_str("general"),
            Self::SecondaryFeed => f.write_str("secondary_feed"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Chat services reject empty content.
    #[error("message content cannot be empty")]
    EmptyMessage,

    #[error("no destination configured for channel {0}")]
    NoRoute(Channel),

    #[error("outbound queue is full")]
    QueueFull,

    #[error("sink writer has shut down")]
    Closed,

    #[error("webhook rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

pub trait NotificationSink: Send + Sync {
    /// Hands `text` off for delivery to `channel`. Must not block on the network.
    fn send(&self, text: &str, channel: Channel) -> Result<(), SinkError>;
}

// ---------------------------------------------------------------------------
// LogSink — used when no webhook is configured
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn send(&self, text: &str, channel: Channel) -> Result<(), SinkError> {
        if text.trim().is_empty() {
            return Err(SinkError::EmptyMessage);
        }
        tracing::info!(%channel, "{}", text);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// WebhookSink
// ---------------------------------------------------------------------------

struct Outbound {
    url:     String,
    content: String,
    channel: Channel,
}

/// Handle to the webhook writer thread. Clone + Send + Sync.
#[derive(Clone)]
pub struct WebhookSink {
    general_url:   String,
    secondary_url: String,
    tx:            SyncSender<Outbound>,
}

impl WebhookSink {
    /// Starts the writer thread. An empty `secondary_url` routes the
    /// secondary feed to the general webhook.
    pub fn spawn(general_url: String, secondary_url: String, queue_len: usize) -> Self {
        let (tx, rx) = sync_channel::<Outbound>(queue_len.max(1));
        let agent = webhook_agent();

        std::thread::Builder::new()
            .name("webhook-writer".to_owned())
            .spawn(move || writer_loop(rx, agent))
            .map_err(|e| tracing::error!("Failed to start webhook writer: {}", e))
            .ok();

        tracing::info!("Webhook writer started (queue {})", queue_len);
        Self { general_url, secondary_url, tx }
    }

    fn route(&self, channel: Channel) -> Option<&str> {
        let url = match channel {
            Channel::General => self.general_url.as_str(),
            Channel::SecondaryFeed if !self.secondary_url.is_empty() => self.secondary_url.as_str(),
            Channel::SecondaryFeed => self.general_url.as_str(),
        };
        (!url.is_empty()).then_some(url)
    }
}

impl NotificationSink for WebhookSink {
    fn send(&self, text: &str, channel: Channel) -> Result<(), SinkError> {
        if text.trim().is_empty() {
            return Err(SinkError::EmptyMessage);
        }
        let url = self.route(channel).ok_or(SinkError::NoRoute(channel))?;
        self.tx
            .try_send(Outbound { url: url.to_owned(), content: text.to_owned(), channel })
            .map_err(|e| match e {
                TrySendError::Full(_)         => SinkError::QueueFull,
                TrySendError::Disconnected(_) => SinkError::Closed,
            })
    }
}

fn webhook_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
}

fn writer_loop(rx: Receiver<Outbound>, agent: ureq::Agent) {
    while let Ok(msg) = rx.recv() {
        match post(&agent, &msg.url, &msg.content) {
            Ok(())  => tracing::debug!(channel = %msg.channel, "Webhook delivered"),
            Err(e)  => tracing::warn!(channel = %msg.channel, "Webhook delivery failed: {}", e),
        }
    }
    tracing::info!("Webhook writer exiting");
}

fn post(agent: &ureq::Agent, url: &str, content: &str) -> Result<(), SinkError> {
    let payload = serde_json::json!({ "content": content }).to_string();
    match agent
        .post(url)
        .set("Content-Type", "application/json")
        .send_string(&payload)
    {
        Ok(_) => Ok(()),
        Err(ureq::Error::Status(status, response)) => Err(SinkError::Rejected {
            status,
            body: response.into_string().unwrap_or_default(),
        }),
        Err(e) => Err(SinkError::Http(e.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};

    /// Reads one HTTP/1.1 request; returns (request line + headers, body).
    fn read_request(stream: &TcpStream) -> (String, String) {
        let mut reader = BufReader::new(stream);
        let mut head = String::new();
        let mut content_length = 0;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            if line.is_empty() || line == "\r\n" {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap();
                }
            }
            head.push_str(&line);
        }
        let mut body = vec![0; content_length];
        reader.read_exact(&mut body).unwrap();
        (head, String::from_utf8(body).unwrap())
    }

    fn local_listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        (listener, url)
    }

    /// Sink whose writer never drains the queue.
    fn stalled_sink(queue_len: usize) -> (WebhookSink, Receiver<Outbound>) {
        let (tx, rx) = sync_channel(queue_len);
        let sink = WebhookSink {
            general_url:   "http://127.0.0.1:9/general".to_owned(),
            secondary_url: String::new(),
            tx,
        };
        (sink, rx)
    }

    #[test]
    fn posts_content_json_to_webhook() {
        let (listener, url) = local_listener();
        let sink = WebhookSink::spawn(url, String::new(), 4);
        sink.send("It seems Alex is farming Zombies", Channel::SecondaryFeed).unwrap();

        let (mut stream, _) = listener.accept().unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let (head, body) = read_request(&stream);
        stream
            .write_all(b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n")
            .unwrap();

        assert!(head.starts_with("POST /hook HTTP/1.1"));
        assert!(head.to_ascii_lowercase().contains("content-type: application/json"));
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "content": "It seems Alex is farming Zombies" }));
    }

    #[test]
    fn non_success_status_is_rejected() {
        let (listener, url) = local_listener();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            read_request(&stream);
            stream
                .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 5\r\n\r\nnope!")
                .unwrap();
        });

        let err = post(&webhook_agent(), &url, "hello").unwrap_err();
        server.join().unwrap();
        match err {
            SinkError::Rejected { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "nope!");
            }
            other => panic!("expected Rejected, got {:?}", other),
        }
    }

    #[test]
    fn full_queue_reports_queue_full() {
        let (sink, _rx) = stalled_sink(1);
        assert!(sink.send("first", Channel::General).is_ok());
        assert!(matches!(sink.send("second", Channel::General), Err(SinkError::QueueFull)));
    }

    #[test]
    fn dead_writer_reports_closed() {
        let (sink, rx) = stalled_sink(1);
        drop(rx);
        assert!(matches!(sink.send("hello", Channel::General), Err(SinkError::Closed)));
    }

    #[test]
    fn rejects_empty_messages() {
        assert!(matches!(LogSink.send("   ", Channel::General), Err(SinkError::EmptyMessage)));
        assert!(LogSink.send("hello", Channel::SecondaryFeed).is_ok());
    }

    #[test]
    fn secondary_falls_back_to_general() {
        let sink = WebhookSink::spawn("http://127.0.0.1:9/general".into(), String::new(), 4);
        assert_eq!(sink.route(Channel::SecondaryFeed), Some("http://127.0.0.1:9/general"));

        let split = WebhookSink::spawn("http://a".into(), "http://b".into(), 4);
        assert_eq!(split.route(Channel::General), Some("http://a"));
        assert_eq!(split.route(Channel::SecondaryFeed), Some("http://b"));
    }

    #[test]
    fn unconfigured_channel_has_no_route() {
        let sink = WebhookSink::spawn(String::new(), String::new(), 4);
        assert!(matches!(
            sink.send("farming!", Channel::SecondaryFeed),
            Err(SinkError::NoRoute(Channel::SecondaryFeed))
        ));
    }

    #[test]
    fn channel_names() {
        assert_eq!(Channel::General.to_string(), "general");
        assert_eq!(Channel::SecondaryFeed.to_string(), "secondary_feed");
    }
}
