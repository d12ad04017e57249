//! Small collaborators that the core depends on but that carry no
//! interesting policy of their own (§2 C9, §3).

pub mod net;
pub mod path;
pub mod string;
