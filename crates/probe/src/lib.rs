//! Reference collaborators for the scheduler: a TCP/HTTP probe runner and
//! candidate sources backed by subscription URLs or a local file.

pub mod error;
pub mod source;
pub mod tcp;

pub use error::ProbeError;
pub use source::{parse_list, FileSource, HttpListSource};
pub use tcp::TcpProbeRunner;
