//! `chatdir room`: run a chat room registered with the directory.

use chatdir_core::truncate_bytes;
use chatdir_protocol::{MAX_TOPIC_LEN, Topic};
use chatdir_server::{ChatDispatcher, ExitReason, Reactor, ServerConfig, SignalHandler};
use tracing::{info, warn};

use crate::config::ChatConfig;
use crate::error::{ClientError, ClientResult};

/// Runs a room on `0.0.0.0:<port>` until a signal arrives or the directory
/// drops the registration link.
pub fn run(config: &ChatConfig, topic: &str, port: u16) -> ClientResult<()> {
    let topic = room_topic(topic)?;
    let directory = config.directory_addr()?;
    let tls = config.tls_context(true)?;

    let server = config.server_config(ServerConfig::room(port));
    let mut reactor = Reactor::bind(server, ChatDispatcher::new(), tls)?;
    reactor.register_with_directory(directory, &topic)?;
    SignalHandler::new(reactor.shutdown_handle()).spawn_listener()?;

    match reactor.run()? {
        ExitReason::Shutdown => info!(topic = %topic, "Room stopped"),
        ExitReason::UpstreamClosed => {
            warn!(topic = %topic, "Directory closed the registration, shutting down")
        }
    }
    Ok(())
}

/// Checks a room topic, truncating it to the registration limit.
pub fn room_topic(topic: &str) -> ClientResult<Topic> {
    if topic.contains([',', ';']) {
        return Err(ClientError::Input(format!(
            "topic {topic:?} must not contain ',' or ';'"
        )));
    }
    let (kept, truncated) = truncate_bytes(topic, MAX_TOPIC_LEN);
    if truncated {
        warn!(topic, truncated = kept, "Topic is longer than {MAX_TOPIC_LEN} bytes, truncating");
    }
    Topic::new(kept).map_err(ClientError::from)
}
