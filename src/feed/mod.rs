pub mod curator;
pub mod scorer;

pub use curator::FeedCurator;
pub use scorer::RelevancyScorer;
