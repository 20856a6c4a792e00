//! HTTP/2 framing and stream multiplexing (spec §4.H).

mod frame;
mod session;

pub use frame::{
    encode_priority, encode_settings_ack, encode_window_update, settings_order_from_profile, FrameType, Setting,
    SettingId, SettingsOrder, SettingsOrderBuilder, FRAME_HEADER_LEN,
};
pub use session::{Http2Session, StreamResponse, StreamState, CONNECTION_PREFACE};
