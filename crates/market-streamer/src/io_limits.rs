use rlimit::Resource;
use tracing::{info, warn};

/// Raises the process file-descriptor limit as high as the OS will allow
/// and returns a connection-pool size sized off of it. One open file
/// descriptor per pooled HTTP connection plus headroom for the publish
/// socket and the static-data client.
pub fn init_io() -> usize {
    match Resource::NOFILE.get() {
        Ok((soft, hard)) => {
            if soft < hard {
                if let Err(err) = Resource::NOFILE.set(hard, hard) {
                    warn!(error = %err, "failed to raise file descriptor limit");
                } else {
                    info!(limit = hard, "raised file descriptor limit");
                }
            }
        }
        Err(err) => warn!(error = %err, "failed to read file descriptor limit"),
    }

    32
}
