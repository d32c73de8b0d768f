mod attribution_ops;
mod cluster_ops;
mod event_ops;
mod tx_ops;

pub use attribution_ops::*;
pub use cluster_ops::*;
pub use event_ops::*;
pub use tx_ops::*;
