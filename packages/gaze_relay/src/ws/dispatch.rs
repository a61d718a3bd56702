//! Command dispatcher.
//!
//! Maps one decoded [`Command`] to exactly one cache operation and one
//! [`Response`]. Holds no state between calls.

use tracing::debug;

use crate::cache::GazeCache;

use super::protocol::{Command, ProtocolError, Response, decode_command};

/// Run `command` against the cache.
pub async fn dispatch(cache: &GazeCache, command: Command) -> Response {
    match command {
        Command::GetMovements => Response::Movements(cache.drain().await),
        Command::GetCurrentLocation => Response::CurrentLocation(cache.peek_last().await),
        Command::CheckStatus => Response::Status(cache.has_pending().await),
    }
}

/// Outcome of handling one raw message, for the caller's bookkeeping.
#[derive(Debug)]
pub enum Handled {
    Command(Command, Response),
    Rejected(ProtocolError, Response),
}

/// Decode a text message and dispatch it. Bad input never reaches the cache.
pub async fn handle_text(cache: &GazeCache, text: &str) -> Handled {
    match decode_command(text) {
        Ok(command) => {
            let response = dispatch(cache, command).await;
            Handled::Command(command, response)
        }
        Err(err) => {
            debug!("rejecting client message: {}", err);
            let response = Response::Error(err.to_string());
            Handled::Rejected(err, response)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{GazeSample, Location};
    use std::sync::Arc;

    async fn cache_with(samples: &[(f64, i64)]) -> GazeCache {
        let cache = GazeCache::new(100);
        cache
            .append_batch(
                samples
                    .iter()
                    .map(|&(v, t)| GazeSample::new(v, v, t))
                    .collect(),
            )
            .await;
        cache
    }

    #[tokio::test]
    async fn get_movements_drains() {
        let cache = cache_with(&[(0.1, 1), (0.2, 2)]).await;

        let response = dispatch(&cache, Command::GetMovements).await;
        assert_eq!(
            response,
            Response::Movements(vec![GazeSample::new(0.1, 0.1, 1), GazeSample::new(0.2, 0.2, 2)])
        );
        assert_eq!(
            dispatch(&cache, Command::GetMovements).await,
            Response::Movements(Vec::new())
        );
    }

    #[tokio::test]
    async fn get_current_location_peeks() {
        let cache = GazeCache::new(10);
        assert_eq!(
            dispatch(&cache, Command::GetCurrentLocation).await,
            Response::CurrentLocation(None)
        );

        let cache = cache_with(&[(0.1, 1), (0.4, 2)]).await;
        assert_eq!(
            dispatch(&cache, Command::GetCurrentLocation).await,
            Response::CurrentLocation(Some(Location { x: 0.4, y: 0.4 }))
        );
        // Peeking leaves the buffer alone.
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn check_status_reflects_pending() {
        let cache = cache_with(&[(0.1, 1)]).await;
        assert_eq!(dispatch(&cache, Command::CheckStatus).await, Response::Status(true));
        cache.drain().await;
        assert_eq!(dispatch(&cache, Command::CheckStatus).await, Response::Status(false));
    }

    #[tokio::test]
    async fn bogus_command_leaves_cache_untouched() {
        let cache = cache_with(&[(0.1, 1), (0.2, 2), (0.3, 3)]).await;

        let handled = handle_text(&cache, r#"{"command": "bogus"}"#).await;
        assert!(matches!(
            handled,
            Handled::Rejected(ProtocolError::UnknownCommand(ref c), Response::Error(_))
                if c == "bogus"
        ));

        assert_eq!(cache.len().await, 3);
        assert_eq!(cache.peek_last().await, Some(Location { x: 0.3, y: 0.3 }));
    }

    #[tokio::test]
    async fn malformed_text_is_rejected() {
        let cache = GazeCache::new(10);
        let handled = handle_text(&cache, "{not json").await;
        assert!(matches!(handled, Handled::Rejected(ProtocolError::Malformed(_), _)));
    }

    #[tokio::test]
    async fn simultaneous_get_movements_split_cleanly() {
        let cache = Arc::new(cache_with(&[(0.1, 1), (0.2, 2), (0.3, 3), (0.4, 4), (0.5, 5)]).await);

        let a = tokio::spawn({
            let cache = cache.clone();
            async move { handle_text(&cache, r#"{"command":"get_movements"}"#).await }
        });
        let b = tokio::spawn({
            let cache = cache.clone();
            async move { handle_text(&cache, r#"{"command":"get_movements"}"#).await }
        });

        let mut lengths = Vec::new();
        for handled in [a.await.unwrap(), b.await.unwrap()] {
            match handled {
                Handled::Command(Command::GetMovements, Response::Movements(samples)) => {
                    lengths.push(samples.len())
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        lengths.sort();
        assert_eq!(lengths, vec![0, 5]);
    }
}
