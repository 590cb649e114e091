mod monitor_signature;

pub use monitor_signature::{
    heartbeat_signature,
    push_signature,
    signature_for,
    verify_heartbeat,
    verify_push,
    verify_signature,
    SignatureError,
};
