//! The node session: negotiation, event handling, submission, reconnection.

use super::broker::SubmitSlot;
use super::{http, ws, ClientMessage, NetConfig, NetworkError, ServerMessage};
use crate::miner::state::MiningState;
use crate::miner::Target;
use futures::pin_mut;
use futures::{SinkExt, TryStreamExt};
use log::{debug, info, warn};
use std::cmp::min;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime;

/// Initial reconnect delay.
const BACKOFF_START: Duration = Duration::from_secs(1);

/// Ceiling for the reconnect delay.
const BACKOFF_MAX: Duration = Duration::from_secs(60);

/// How often the session checks for a global stop.
const STOP_POLL: Duration = Duration::from_secs(1);

/// Drive the node connection on the calling thread until mining stops, or
/// until the connection fails with reconnection disabled.
pub fn run(
    cfg: &NetConfig,
    state: Arc<MiningState>,
    slot: Arc<SubmitSlot>,
) -> Result<(), NetworkError> {
    let rt = runtime::Builder::new_current_thread().enable_all().build()?;
    rt.block_on(session_loop(cfg, state, slot))
}

async fn session_loop(
    cfg: &NetConfig,
    state: Arc<MiningState>,
    slot: Arc<SubmitSlot>,
) -> Result<(), NetworkError> {
    let mut backoff = BACKOFF_START;

    loop {
        if state.is_stopped() {
            return Ok(());
        }

        let connected = async {
            let url = http::ws_start(&cfg.node).await?;
            debug!("negotiated websocket url {}", url);
            ws::ws_connect(url).await
        }
        .await;

        let outcome = match connected {
            Ok((sink, stream)) => {
                info!("connected to {}", cfg.node);
                backoff = BACKOFF_START;

                let outcome = session(sink, stream, &state, &slot).await;

                // the session is over: idle the workers and resolve anything
                // still in flight before reconnecting
                state.clear_target();
                slot.clear(false);
                info!("disconnected from {}", cfg.node);

                outcome
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => return Ok(()),
            Err(e) if cfg.no_reconnect => return Err(e),
            Err(e) => {
                warn!("connection lost: {}; reconnecting in {:?}", e, backoff);
                tokio::time::sleep(backoff).await;
                backoff = min(backoff * 2, BACKOFF_MAX);
            }
        }
    }
}

/// Run one connected session. Returns Ok when a stop was requested and Err
/// when the connection died.
async fn session<Si, St>(
    sink: Si,
    stream: St,
    state: &MiningState,
    slot: &SubmitSlot,
) -> Result<(), NetworkError>
where
    Si: futures::Sink<ClientMessage, Error = NetworkError>,
    St: futures::Stream<Item = Result<ServerMessage, NetworkError>>,
{
    pin_mut!(sink);
    pin_mut!(stream);

    loop {
        tokio::select! {
            message = stream.try_next() => {
                match message? {
                    None => return Err(NetworkError::ConnectionClosed),
                    Some(message) => handle_message(message, state, slot),
                }
            }
            _ = slot.notified() => {
                if let Some(solution) = slot.peek() {
                    let id = slot.current_id();
                    info!("submitting solution {} (id {})", solution.nonce_str(), id);
                    sink.send(ClientMessage::submit_block(id, &solution)).await?;
                }
            }
            _ = tokio::time::sleep(STOP_POLL) => {}
        }

        if state.is_stopped() {
            return Ok(());
        }
    }
}

fn handle_message(message: ServerMessage, state: &MiningState, slot: &SubmitSlot) {
    match message {
        ServerMessage::Reply {
            id,
            ok,
            error,
            block,
            work,
        } => {
            if slot.peek().is_none() || id != slot.current_id() {
                debug!("ignoring reply with id {}", id);
                return;
            }

            if ok {
                if let (Some(block), Some(work)) = (block, work) {
                    match block.height {
                        Some(height) => info!(
                            "solution accepted, block {} mined at height {}",
                            block.short_hash, height
                        ),
                        None => info!("solution accepted, block {} mined", block.short_hash),
                    }
                    state.set_target(Target {
                        work,
                        block: block.short_hash,
                    });
                } else {
                    info!("solution accepted");
                }
                slot.clear(true);
            } else {
                warn!(
                    "solution rejected: {}",
                    error.unwrap_or_else(|| "no reason given".into())
                );
                slot.clear(false);
            }
        }

        ServerMessage::Target {
            msg_type,
            event,
            block,
            work,
        } => {
            // of the event messages only block announcements carry a target
            if msg_type == "event" && event.as_deref() != Some("block") {
                debug!("ignoring {:?} event", event);
                return;
            }

            debug!(
                "target from {} message: work {} block {}",
                msg_type, work, block.short_hash
            );
            state.set_target(Target {
                work,
                block: block.short_hash,
            });
        }

        ServerMessage::KeepAlive { .. } => {}

        ServerMessage::Unknown { msg_type, .. } => {
            debug!("ignoring message of type {:?}", msg_type);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::krist::address::Address;
    use crate::krist::block::{Block, ShortHash};
    use crate::miner::Solution;
    use std::str::FromStr;
    use std::thread;
    use std::time::Duration;

    fn rendezvous() -> (Arc<MiningState>, Arc<SubmitSlot>) {
        let slot = Arc::new(SubmitSlot::new());
        let state = {
            let slot = Arc::clone(&slot);
            Arc::new(MiningState::new(
                Address::from_str("k5ztameslf").unwrap(),
                Box::new(move |solution: Solution| slot.submit_and_wait(solution)),
            ))
        };
        (state, slot)
    }

    fn target(work: u64, block: &str) -> Target {
        Target {
            work,
            block: ShortHash::from_str(block).unwrap(),
        }
    }

    fn wait_for<F: Fn() -> bool>(what: &str, predicate: F) {
        for _ in 0..1000 {
            if predicate() {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!("timed out waiting for {}", what);
    }

    #[test]
    fn target_message_installs_target() {
        let (state, slot) = rendezvous();

        handle_message(
            ServerMessage::Target {
                msg_type: "hello".into(),
                event: None,
                block: Block {
                    short_hash: ShortHash::from_str("000000000cad").unwrap(),
                    height: None,
                },
                work: 7712,
            },
            &state,
            &slot,
        );

        assert_eq!(state.generation(), 1);
        assert_eq!(state.wait_for_target().unwrap().0, target(7712, "000000000cad"));
    }

    #[test]
    fn non_block_events_are_ignored() {
        let (state, slot) = rendezvous();

        handle_message(
            ServerMessage::Target {
                msg_type: "event".into(),
                event: Some("transaction".into()),
                block: Block {
                    short_hash: ShortHash::from_str("000000000cad").unwrap(),
                    height: None,
                },
                work: 7712,
            },
            &state,
            &slot,
        );

        assert_eq!(state.generation(), 0);
    }

    #[test]
    fn unrelated_reply_is_ignored() {
        let (state, slot) = rendezvous();

        handle_message(
            ServerMessage::Reply {
                id: 9,
                ok: true,
                error: None,
                block: None,
                work: None,
            },
            &state,
            &slot,
        );

        assert_eq!(state.total_solved(), 0);
        assert_eq!(slot.current_id(), 1);
    }

    #[test]
    fn accepted_reply_installs_new_target_and_counts() {
        let (state, slot) = rendezvous();
        state.set_target(target(7712, "000000000cad"));

        let worker = {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                state.report_solution(Solution {
                    address: state.address(),
                    nonce: *b"aa0000000000",
                })
            })
        };

        wait_for("the submission", || slot.peek().is_some());

        handle_message(
            ServerMessage::Reply {
                id: 1,
                ok: true,
                error: None,
                block: Some(Block {
                    short_hash: ShortHash::from_str("abcdef012345").unwrap(),
                    height: Some(8),
                }),
                work: Some(50000),
            },
            &state,
            &slot,
        );

        assert!(worker.join().unwrap());
        assert_eq!(state.total_solved(), 1);
        assert_eq!(state.generation(), 2);
        assert_eq!(
            state.wait_for_target().unwrap().0,
            target(50000, "abcdef012345")
        );
    }

    #[test]
    fn rejected_reply_restores_previous_target() {
        let (state, slot) = rendezvous();
        state.set_target(target(7712, "000000000cad"));

        let worker = {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                state.report_solution(Solution {
                    address: state.address(),
                    nonce: *b"aa0000000000",
                })
            })
        };

        wait_for("the submission", || slot.peek().is_some());

        handle_message(
            ServerMessage::Reply {
                id: 1,
                ok: false,
                error: Some("solution_duplicate".into()),
                block: None,
                work: None,
            },
            &state,
            &slot,
        );

        assert!(!worker.join().unwrap());
        assert_eq!(state.total_solved(), 0);
        assert_eq!(state.generation(), 1);
        assert!(state.is_current(1));
        assert_eq!(
            state.wait_for_target().unwrap().0,
            target(7712, "000000000cad")
        );
    }
}
