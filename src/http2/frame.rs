//! HTTP/2 frame encoding for the subset of frame types this engine needs
//! to emit with byte-exact Chrome ordering: SETTINGS, WINDOW_UPDATE, and
//! PRIORITY (spec §4.H). Shaped after `primp-h2`'s `frame/settings.rs` and
//! `frame/priority.rs` (the teacher's own fork of the `h2` crate), adapted
//! down to only what this crate writes itself — full frame *parsing* (and
//! HEADERS/DATA/CONTINUATION) lives in `http2::session`, which drives an
//! `hpack::Encoder`/`Decoder` for header (de)compression instead of
//! reimplementing HPACK here.

pub const FRAME_HEADER_LEN: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data = 0x0,
    Headers = 0x1,
    Priority = 0x2,
    RstStream = 0x3,
    Settings = 0x4,
    PushPromise = 0x5,
    Ping = 0x6,
    GoAway = 0x7,
    WindowUpdate = 0x8,
    Continuation = 0x9,
}

fn write_frame_header(out: &mut Vec<u8>, length: u32, frame_type: FrameType, flags: u8, stream_id: u32) {
    out.extend_from_slice(&length.to_be_bytes()[1..4]);
    out.push(frame_type as u8);
    out.push(flags);
    out.extend_from_slice(&(stream_id & 0x7fff_ffff).to_be_bytes());
}

/// One HTTP/2 SETTINGS parameter ID (spec §4.H / RFC 9113 §11.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingId {
    HeaderTableSize = 0x1,
    EnablePush = 0x2,
    MaxConcurrentStreams = 0x3,
    InitialWindowSize = 0x4,
    MaxFrameSize = 0x5,
    MaxHeaderListSize = 0x6,
    EnableConnectProtocol = 0x8,
    NoRfc7540Priorities = 0x9,
}

#[derive(Debug, Clone, Copy)]
pub struct Setting {
    pub id: SettingId,
    pub value: u32,
}

/// An ordered, deduplicated list of settings to send in one SETTINGS
/// frame — order matters for fingerprinting, so this is a `Vec`, not a map.
#[derive(Debug, Clone, Default)]
pub struct SettingsOrder {
    entries: Vec<Setting>,
}

impl SettingsOrder {
    pub fn builder() -> SettingsOrderBuilder {
        SettingsOrderBuilder::default()
    }

    pub fn entries(&self) -> &[Setting] {
        &self.entries
    }

    /// Encodes a SETTINGS frame body (not an ACK) in this exact order.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FRAME_HEADER_LEN + self.entries.len() * 6);
        write_frame_header(&mut out, (self.entries.len() * 6) as u32, FrameType::Settings, 0, 0);
        for setting in &self.entries {
            out.extend_from_slice(&(setting.id as u16).to_be_bytes());
            out.extend_from_slice(&setting.value.to_be_bytes());
        }
        out
    }
}

/// Encodes a zero-length SETTINGS ACK frame.
pub fn encode_settings_ack() -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN);
    write_frame_header(&mut out, 0, FrameType::Settings, 0x1, 0);
    out
}

#[derive(Default)]
pub struct SettingsOrderBuilder {
    entries: Vec<Setting>,
    seen: u16,
}

impl SettingsOrderBuilder {
    /// Appends a setting, skipping it if this ID was already pushed — a
    /// bitmask dedup check (8 known IDs fit comfortably in a u16), so the
    /// caller can list settings in Chrome's order without worrying about
    /// accidental duplicates.
    pub fn push(mut self, id: SettingId, value: u32) -> Self {
        let bit = 1u16 << (id as u16);
        if self.seen & bit != 0 {
            return self;
        }
        self.seen |= bit;
        self.entries.push(Setting { id, value });
        self
    }

    pub fn build(self) -> SettingsOrder {
        SettingsOrder { entries: self.entries }
    }
}

/// Encodes a connection- or stream-level WINDOW_UPDATE frame.
pub fn encode_window_update(stream_id: u32, increment: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + 4);
    write_frame_header(&mut out, 4, FrameType::WindowUpdate, 0, stream_id);
    out.extend_from_slice(&(increment & 0x7fff_ffff).to_be_bytes());
    out
}

/// RFC 7540 §5.3-style PRIORITY frame: `stream_dependency`, `exclusive`,
/// and `weight`. Chrome 143 does not send PRIORITY frames at all (spec
/// §4.A, §4.H, §8 invariant 2 — the Akamai fingerprint's frame list is
/// `m,a,s,p` with zero PRIORITY frames); this encoder is kept for the
/// wire format's own sake but `http2::session` never calls it.
pub fn encode_priority(stream_id: u32, stream_dependency: u32, exclusive: bool, weight: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + 5);
    write_frame_header(&mut out, 5, FrameType::Priority, 0, stream_id);
    let mut dep = stream_dependency & 0x7fff_ffff;
    if exclusive {
        dep |= 0x8000_0000;
    }
    out.extend_from_slice(&dep.to_be_bytes());
    out.push(weight);
    out
}

/// Builds the SETTINGS values a `FingerprintProfile` says Chrome sends,
/// honoring which settings Chrome omits entirely (spec §8 invariant 2).
pub fn settings_order_from_profile(profile: &crate::fingerprint::FingerprintProfile) -> SettingsOrder {
    let s = &profile.settings;
    let mut builder = SettingsOrder::builder();
    if let Some(v) = s.header_table_size {
        builder = builder.push(SettingId::HeaderTableSize, v);
    }
    if let Some(v) = s.enable_push {
        builder = builder.push(SettingId::EnablePush, v);
    }
    if let Some(v) = s.initial_window_size {
        builder = builder.push(SettingId::InitialWindowSize, v);
    }
    if let Some(v) = s.max_header_list_size {
        builder = builder.push(SettingId::MaxHeaderListSize, v);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_order_preserves_push_order() {
        let order = SettingsOrder::builder()
            .push(SettingId::HeaderTableSize, 65536)
            .push(SettingId::InitialWindowSize, 6_291_456)
            .build();
        let ids: Vec<_> = order.entries().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![SettingId::HeaderTableSize, SettingId::InitialWindowSize]);
    }

    #[test]
    fn duplicate_setting_id_is_ignored() {
        let order = SettingsOrder::builder()
            .push(SettingId::EnablePush, 0)
            .push(SettingId::EnablePush, 1)
            .build();
        assert_eq!(order.entries().len(), 1);
        assert_eq!(order.entries()[0].value, 0);
    }

    #[test]
    fn encode_produces_correct_frame_header() {
        let order = SettingsOrder::builder().push(SettingId::HeaderTableSize, 65536).build();
        let bytes = order.encode();
        assert_eq!(&bytes[0..3], &[0, 0, 6]); // length = 6 (one setting)
        assert_eq!(bytes[3], FrameType::Settings as u8);
        assert_eq!(bytes[4], 0); // not an ACK
    }

    #[test]
    fn window_update_masks_reserved_bit() {
        let bytes = encode_window_update(0, 15_663_105);
        let increment = u32::from_be_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]);
        assert_eq!(increment, 15_663_105);
        assert_eq!(increment & 0x8000_0000, 0);
    }

    #[test]
    fn settings_from_profile_omits_unset_values() {
        let profile = crate::fingerprint::FingerprintProfile::chrome_143(false);
        let order = settings_order_from_profile(&profile);
        let ids: Vec<_> = order.entries().iter().map(|s| s.id).collect();
        assert!(!ids.contains(&SettingId::MaxConcurrentStreams));
        assert!(!ids.contains(&SettingId::MaxFrameSize));
        assert!(ids.contains(&SettingId::HeaderTableSize));
    }
}
