use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Ticks once per `interval_ms`, signalling the node to broadcast a
/// heartbeat to its known peers. The actual send is wired up by
/// `dmesh-node`, which owns the transport client.
pub fn spawn_heartbeat_ticker(interval_ms: u64, tick: mpsc::UnboundedSender<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
        loop {
            interval.tick().await;
            if tick.send(()).is_err() {
                return;
            }
        }
    })
}
