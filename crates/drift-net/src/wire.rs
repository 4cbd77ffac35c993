//! Wire messages
//!
//! Entity diffs carry only the fields that changed since the previous send.
//! Single-letter keys keep per-tick packets small: `p` position, `q`
//! orientation, `m` locomotion mode, `a` movement axis, `g` gaze, `e` emote,
//! `t` teleport, `ef` effect.

use drift_core::EntityId;
use glam::{Quat, Vec3};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{WireError, WireResult};

/// Temporary override of a player's control, applied locally and relayed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Effect {
    /// Named anchor the player is attached to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor_id: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub freeze: bool,
    /// Fraction of move speed removed, 0..=1; any snare blocks jumping
    #[serde(skip_serializing_if = "is_zero")]
    pub snare: f32,
    /// Face the camera direction even while idle
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub turn: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emote: Option<String>,
    /// Seconds until the effect clears itself
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f32>,
    /// Movement or jump input ends the effect
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cancellable: bool,
}

fn is_zero(v: &f32) -> bool {
    *v == 0.0
}

/// Present-but-null must survive decoding as `Some(None)` so a cleared
/// emote or effect is distinguishable from an unchanged one.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Per-entity state diff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityModified {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<Quat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub g: Option<Vec3>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub e: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<bool>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub ef: Option<Option<Effect>>,
}

impl EntityModified {
    /// Diff with no fields set
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            p: None,
            q: None,
            m: None,
            a: None,
            g: None,
            e: None,
            t: None,
            ef: None,
        }
    }

    /// True when the diff carries nothing besides the id
    pub fn is_empty(&self) -> bool {
        self.p.is_none()
            && self.q.is_none()
            && self.m.is_none()
            && self.a.is_none()
            && self.g.is_none()
            && self.e.is_none()
            && self.t.is_none()
            && self.ef.is_none()
    }

    pub fn is_teleport(&self) -> bool {
        self.t.is_some()
    }
}

/// Messages relayed between clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Packet {
    EntityModified(EntityModified),
    EntityRemoved(EntityId),
}

impl Packet {
    pub fn encode(&self) -> WireResult<String> {
        serde_json::to_string(self).map_err(WireError::Encode)
    }

    pub fn decode(text: &str) -> WireResult<Self> {
        serde_json::from_str(text).map_err(WireError::Decode)
    }
}

/// Outgoing packet sink
pub trait Outbox {
    fn send(&mut self, packet: Packet);
}

impl Outbox for Vec<Packet> {
    fn send(&mut self, packet: Packet) {
        self.push(packet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn only_changed_fields_are_encoded() {
        let id = EntityId::new();
        let mut diff = EntityModified::new(id);
        diff.p = Some(Vec3::new(1.0, 2.0, 3.0));
        diff.m = Some(2);

        let value = serde_json::to_value(&diff).unwrap();
        assert_eq!(
            value,
            json!({ "id": id.to_string(), "p": [1.0, 2.0, 3.0], "m": 2 })
        );
    }

    #[test]
    fn cleared_emote_decodes_as_present_null() {
        let id = EntityId::new();
        let text = format!(r#"{{"id":"{id}","e":null}}"#);
        let diff: EntityModified = serde_json::from_str(&text).unwrap();
        assert_eq!(diff.e, Some(None));
        assert!(!diff.is_empty());

        let text = format!(r#"{{"id":"{id}"}}"#);
        let diff: EntityModified = serde_json::from_str(&text).unwrap();
        assert_eq!(diff.e, None);
        assert!(diff.is_empty());
    }

    #[test]
    fn effect_uses_camel_case_and_omits_defaults() {
        let effect = Effect {
            anchor_id: Some("seat".into()),
            cancellable: true,
            ..Default::default()
        };
        let value = serde_json::to_value(&effect).unwrap();
        assert_eq!(value, json!({ "anchorId": "seat", "cancellable": true }));
    }

    #[test]
    fn packet_roundtrips_through_text() {
        let mut diff = EntityModified::new(EntityId::new());
        diff.t = Some(true);
        diff.ef = Some(None);
        let packet = Packet::EntityModified(diff);

        let text = packet.encode().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "entityModified");
        assert_eq!(value["data"]["ef"], Value::Null);

        let decoded = Packet::decode(&text).unwrap();
        assert_eq!(decoded, packet);
        match decoded {
            Packet::EntityModified(diff) => assert!(diff.is_teleport()),
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn malformed_packet_is_a_decode_error() {
        let err = Packet::decode(r#"{"type":"entityModified","data":{"p":[1]}}"#).unwrap_err();
        assert!(matches!(err, WireError::Decode(_)));
    }

    #[test]
    fn vec_outbox_collects_packets() {
        let mut outbox: Vec<Packet> = Vec::new();
        let id = EntityId::new();
        outbox.send(Packet::EntityRemoved(id));
        assert_eq!(outbox, vec![Packet::EntityRemoved(id)]);
    }
}
