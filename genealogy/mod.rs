pub mod sequence;
pub mod stability;
pub mod tmrca;
pub mod tree;

pub use sequence::{SequenceError, Site, TreeSequence, TreeSequenceData};
pub use stability::{DEFAULT_PSD_TOLERANCE, StabilityError, check_psd, solve, solve_covariance};
pub use tmrca::GenealogyMatrix;
pub use tree::{Interval, LocalTree, NodeId, NodeRecord, Tree, TreeError};
