//! Mutation Module
//!
//! Wire format of queued mutations. A record travels as
//! `{"op": ..., "entity": ..., "payload": {...}}` and is decoded straight
//! into the closed `Mutation` enum, so unknown operations or entities fail
//! at decode time.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::{Comment, CommentKey, Favorite, FavoriteKey, Follow, FollowKey, Video};
use crate::queue::QueueError;
use crate::store::{EntityKind, Record, RecordKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Insert,
    Delete,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    op: Op,
    entity: EntityKind,
    payload: Value,
}

#[derive(Deserialize)]
struct IdPayload {
    id: u64,
}

/// A store write deferred behind the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Insert(Record),
    Delete(RecordKey),
}

impl Mutation {
    pub fn op(&self) -> Op {
        match self {
            Mutation::Insert(_) => Op::Insert,
            Mutation::Delete(_) => Op::Delete,
        }
    }

    pub fn entity(&self) -> EntityKind {
        match self {
            Mutation::Insert(record) => record.entity(),
            Mutation::Delete(key) => key.entity(),
        }
    }

    pub fn key(&self) -> RecordKey {
        match self {
            Mutation::Insert(record) => record.key(),
            Mutation::Delete(key) => *key,
        }
    }

    /// Ordering scope of the mutation. Derived from the row key, so the
    /// insert and the delete of one relation always share it.
    pub fn affinity_key(&self) -> String {
        self.key().to_string()
    }

    // == Encode ==
    pub fn encode(&self) -> Result<Vec<u8>, QueueError> {
        let payload = match self {
            Mutation::Insert(Record::Favorite(f)) => serde_json::to_value(f),
            Mutation::Insert(Record::Follow(f)) => serde_json::to_value(f),
            Mutation::Insert(Record::Comment(c)) => serde_json::to_value(c),
            Mutation::Insert(Record::Video(v)) => serde_json::to_value(v),
            Mutation::Delete(RecordKey::Favorite(k)) => serde_json::to_value(k),
            Mutation::Delete(RecordKey::Follow(k)) => serde_json::to_value(k),
            Mutation::Delete(RecordKey::Comment(k)) => serde_json::to_value(k),
            Mutation::Delete(RecordKey::Video(id)) => Ok(json!({ "id": id })),
        }
        .map_err(|e| QueueError::Encode(e.to_string()))?;

        serde_json::to_vec(&Envelope {
            op: self.op(),
            entity: self.entity(),
            payload,
        })
        .map_err(|e| QueueError::Encode(e.to_string()))
    }

    // == Decode ==
    pub fn decode(bytes: &[u8]) -> Result<Self, QueueError> {
        let envelope: Envelope = serde_json::from_slice(bytes).map_err(decode_error)?;
        let payload = envelope.payload;

        let mutation = match (envelope.op, envelope.entity) {
            (Op::Insert, EntityKind::Favorite) => {
                Mutation::Insert(Record::Favorite(parse::<Favorite>(payload)?))
            }
            (Op::Insert, EntityKind::Follow) => {
                Mutation::Insert(Record::Follow(parse::<Follow>(payload)?))
            }
            (Op::Insert, EntityKind::Comment) => {
                Mutation::Insert(Record::Comment(parse::<Comment>(payload)?))
            }
            (Op::Insert, EntityKind::Video) => {
                Mutation::Insert(Record::Video(parse::<Video>(payload)?))
            }
            (Op::Delete, EntityKind::Favorite) => {
                Mutation::Delete(RecordKey::Favorite(parse::<FavoriteKey>(payload)?))
            }
            (Op::Delete, EntityKind::Follow) => {
                Mutation::Delete(RecordKey::Follow(parse::<FollowKey>(payload)?))
            }
            (Op::Delete, EntityKind::Comment) => {
                Mutation::Delete(RecordKey::Comment(parse::<CommentKey>(payload)?))
            }
            (Op::Delete, EntityKind::Video) => {
                Mutation::Delete(RecordKey::Video(parse::<IdPayload>(payload)?.id))
            }
        };
        Ok(mutation)
    }
}

fn decode_error(err: serde_json::Error) -> QueueError {
    QueueError::Decode(err.to_string())
}

fn parse<T: DeserializeOwned>(payload: Value) -> Result<T, QueueError> {
    serde_json::from_value(payload).map_err(decode_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn favorite() -> Favorite {
        Favorite {
            user_id: 1,
            video_id: 2,
            created_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_insert_envelope_shape() {
        let bytes = Mutation::Insert(Record::Favorite(favorite()))
            .encode()
            .unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["op"], "insert");
        assert_eq!(value["entity"], "favorite");
        assert_eq!(value["payload"]["video_id"], 2);
    }

    #[test]
    fn test_decode_delete_comment() {
        let bytes = br#"{"op":"delete","entity":"comment","payload":{"video_id":5,"id":99}}"#;
        assert_eq!(
            Mutation::decode(bytes).unwrap(),
            Mutation::Delete(RecordKey::Comment(CommentKey { video_id: 5, id: 99 }))
        );
    }

    #[test]
    fn test_comment_delete_without_video_is_decode_error() {
        let bytes = br#"{"op":"delete","entity":"comment","payload":{"id":99}}"#;
        assert!(matches!(
            Mutation::decode(bytes),
            Err(QueueError::Decode(_))
        ));
    }

    #[test]
    fn test_unknown_entity_is_decode_error() {
        let bytes = br#"{"op":"insert","entity":"playlist","payload":{}}"#;
        assert!(matches!(
            Mutation::decode(bytes),
            Err(QueueError::Decode(_))
        ));
    }

    #[test]
    fn test_unknown_op_is_decode_error() {
        let bytes = br#"{"op":"upsert","entity":"favorite","payload":{}}"#;
        assert!(matches!(
            Mutation::decode(bytes),
            Err(QueueError::Decode(_))
        ));
    }

    #[test]
    fn test_payload_mismatch_is_decode_error() {
        let bytes = br#"{"op":"insert","entity":"video","payload":{"id":1}}"#;
        assert!(matches!(
            Mutation::decode(bytes),
            Err(QueueError::Decode(_))
        ));
    }

    #[test]
    fn test_insert_and_delete_share_affinity() {
        let insert = Mutation::Insert(Record::Favorite(favorite()));
        let delete = Mutation::Delete(RecordKey::Favorite(favorite().key()));

        assert_eq!(insert.affinity_key(), "favorite:1:2");
        assert_eq!(insert.affinity_key(), delete.affinity_key());
    }

    #[test]
    fn test_delete_decodes_from_encoded_form() {
        let delete = Mutation::Delete(RecordKey::Follow(FollowKey {
            follower_id: 4,
            followee_id: 5,
        }));
        let decoded = Mutation::decode(&delete.encode().unwrap()).unwrap();
        assert_eq!(decoded, delete);
    }
}
