//! Data channel control plane
//!
//! Each peer connection carries one negotiated data channel used for
//! in-session control traffic (media state announcements and opaque
//! application payloads). Delivery is best effort: sends to a channel that
//! is not open yet are dropped, and peers resend their full media state on
//! every channel open.

mod messages;

pub use messages::{ControlMessage, MAX_CONTROL_MESSAGE_SIZE};
