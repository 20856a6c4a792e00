//! Chrome fingerprint data: constant tables, the Sec-CH-UA GREASE
//! generator, header sequencing, and the `FingerprintProfile` that ties
//! them together (spec §3, §4.A).

pub mod chrome;
pub mod header_order;
pub mod profile;
pub mod sec_ch_ua;

pub use header_order::{apply_explicit_order, build_h1_headers, build_h2_headers, HeaderField, HighEntropyHints, RequestContext};
pub use profile::{FeatureFlags, FingerprintProfile, PseudoHeaderOrder, SettingsProfile};
pub use sec_ch_ua::SecChUaGenerator;
