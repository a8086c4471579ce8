//! Store ingestion
//!
//! Feeds the round-result store from the oracle subject on the bus. Each
//! message is JSON `{"boxId": "...", "randNum": "..."}`.

use crate::{errors::ConnectionError, store::RoundResultStore};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One oracle-derived round result as carried on the bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundResultMessage {
    pub box_id: String,
    pub rand_num: String,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("malformed round result: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("round result has an empty {0}")]
    Empty(&'static str),
}

pub fn parse_round_result(payload: &[u8]) -> Result<RoundResultMessage, IngestError> {
    let message: RoundResultMessage = serde_json::from_slice(payload)?;
    if message.box_id.is_empty() {
        return Err(IngestError::Empty("boxId"));
    }
    if message.rand_num.is_empty() {
        return Err(IngestError::Empty("randNum"));
    }
    Ok(message)
}

/// Insert every well-formed payload into `store` until the stream ends or
/// `cancel` fires. Returns the number of results stored.
pub async fn run_ingestion<S>(mut payloads: S, store: RoundResultStore, cancel: CancellationToken) -> u64
where
    S: Stream + Unpin,
    S::Item: AsRef<[u8]>,
{
    let mut stored = 0u64;
    loop {
        let payload = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = payloads.next() => match next {
                Some(payload) => payload,
                None => break,
            },
        };

        match parse_round_result(payload.as_ref()) {
            Ok(result) => {
                debug!(box_id = %result.box_id, rand_num = %result.rand_num, "round result stored");
                store.insert(result.box_id, result.rand_num);
                stored += 1;
            }
            Err(e) => warn!(error = %e, "skipping round result message"),
        }
    }
    stored
}

/// Subscribe to `subject` and spawn the ingestion loop
pub async fn spawn_ingestion(
    client: &async_nats::Client,
    subject: &str,
    store: RoundResultStore,
    cancel: CancellationToken,
) -> Result<JoinHandle<u64>, ConnectionError> {
    let subscriber = client
        .subscribe(subject.to_string())
        .await
        .map_err(|e| ConnectionError::Bus {
            endpoint: subject.to_string(),
            reason: e.to_string(),
        })?;

    info!(subject = %subject, "listening for round results");
    let payloads = Box::pin(subscriber.map(|message| message.payload));
    Ok(tokio::spawn(run_ingestion(payloads, store, cancel)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RoundResultSource;
    use futures::stream;

    #[test]
    fn test_parse_round_result() {
        let parsed = parse_round_result(br#"{"boxId":"box123","randNum":"a1b2c3d4"}"#).unwrap();
        assert_eq!(parsed.box_id, "box123");
        assert_eq!(parsed.rand_num, "a1b2c3d4");
    }

    #[test]
    fn test_parse_rejects_empty_fields() {
        assert!(matches!(
            parse_round_result(br#"{"boxId":"","randNum":"ff"}"#),
            Err(IngestError::Empty("boxId"))
        ));
        assert!(matches!(
            parse_round_result(br#"{"boxId":"b","randNum":""}"#),
            Err(IngestError::Empty("randNum"))
        ));
        assert!(matches!(parse_round_result(b"not json"), Err(IngestError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_ingestion_skips_bad_messages() {
        let store = RoundResultStore::new();
        let payloads = stream::iter(vec![
            br#"{"boxId":"box1","randNum":"0a0b"}"#.to_vec(),
            b"garbage".to_vec(),
            br#"{"boxId":"box2","randNum":"0c0d"}"#.to_vec(),
        ]);

        let stored = run_ingestion(payloads, store.clone(), CancellationToken::new()).await;

        assert_eq!(stored, 2);
        assert_eq!(store.get("box1").as_deref(), Some("0a0b"));
        assert_eq!(store.get("box2").as_deref(), Some("0c0d"));
    }

    #[tokio::test]
    async fn test_ingestion_stops_on_cancel() {
        let store = RoundResultStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let stored = run_ingestion(stream::pending::<Vec<u8>>(), store.clone(), cancel).await;

        assert_eq!(stored, 0);
        assert!(store.is_empty());
    }
}
