pub mod embedding;
pub mod keypoints;
pub mod matching;
pub mod similarity;
