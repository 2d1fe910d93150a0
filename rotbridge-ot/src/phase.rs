//! Phase identifiers attached to the `rotbridge_metrics` spans.

pub const BASE_OT: &str = "base-ot";
pub const OT_EXTENSION: &str = "ot-extension";
pub const MALICIOUS_CHECK: &str = "malicious-check";
pub const FLUSH: &str = "flush";
