pub mod replay_buffer;
pub mod reward;
pub mod sum_tree;
pub mod td_target;

pub use replay_buffer::{PriorityReplayBuffer, SampledTransition, PRIORITY_FLOOR};
pub use reward::RewardShaper;
pub use sum_tree::SumTree;
pub use td_target::TdTargetComputer;
