/*!
# Background

This crate defines the message shapes that travel between Apteryx processes:
the requests a client sends to the daemon, the responses it gets back, and
the callback messages the daemon sends to a client's callback server.

Values are opaque byte strings.  On the wire they're carried base64-encoded
inside JSON so the rest of the message stays human-readable; an empty value
means "absent" everywhere in the API, so the encoding never needs an
Option.

`owner`, `cb` and `priv` are opaque 64-bit tokens.  `owner` identifies the
registering process, `cb` is an index into that process's callback table,
and `priv` is caller-defined.  The daemon echoes `cb` and `priv` verbatim
and never interprets them.
*/

mod bytes;

use serde::{Deserialize, Serialize};

/// Store a value at a path.  An empty value deletes the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Set {
    pub path: String,
    #[serde(with = "bytes")]
    pub value: Vec<u8>,
}

/// Read the value at a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Get {
    pub path: String,
}

/// The answer to a Get, and to a Provide callback.  Empty means absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResult {
    #[serde(with = "bytes")]
    pub value: Vec<u8>,
}

/// List the direct children of a directory path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Search {
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub paths: Vec<String>,
}

/// Remove a path and everything below it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prune {
    pub path: String,
}

/// Watch registration and delivery share this shape.  On registration the
/// value is empty and ignored; on delivery it carries the new value of the
/// changed path (empty for a deletion).  A registration with `cb == 0`
/// unregisters the owner's watchers for the pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watch {
    pub path: String,
    #[serde(with = "bytes")]
    pub value: Vec<u8>,
    pub owner: u64,
    pub cb: u64,
    #[serde(rename = "priv")]
    pub priv_: u64,
}

/// Provide registration and delivery share this shape.  On delivery the
/// response is a GetResult with the provided value.  A registration with
/// `cb == 0` unregisters the owner's provider for the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provide {
    pub path: String,
    pub owner: u64,
    pub cb: u64,
    #[serde(rename = "priv")]
    pub priv_: u64,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn set_round_trip() {
        let msg = Set {
            path: "/interfaces/eth0/state".to_string(),
            value: b"up".to_vec(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(serde_json::from_str::<Set>(&json).unwrap(), msg);
    }

    #[test]
    fn value_is_base64_on_the_wire() {
        let msg = Set {
            path: "/raw".to_string(),
            value: vec![0x01, 0x02, 0xff],
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["value"], base64::encode([0x01, 0x02, 0xffu8]));
    }

    #[test]
    fn empty_value_round_trip() {
        let msg = GetResult { value: vec![] };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(serde_json::from_str::<GetResult>(&json).unwrap(), msg);
    }

    #[test]
    fn priv_field_name_on_the_wire() {
        let msg = Provide {
            path: "/hw/counters/tx".to_string(),
            owner: 42,
            cb: 7,
            priv_: 9,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["priv"], 9);
        assert_eq!(json["cb"], 7);
    }

    #[test]
    fn bad_base64_is_rejected() {
        let err = serde_json::from_str::<GetResult>(r#"{"value":"!!!"}"#);
        assert!(err.is_err());
    }
}
