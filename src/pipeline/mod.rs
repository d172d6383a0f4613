pub mod normalize;
pub mod spreadsheet; // GL spreadsheet → canonical rows
pub mod import;
pub mod llm;
pub mod extraction;
pub mod matching; // Document item ↔ GL line scoring
pub mod review; // Batched FAR Part 31 classification
pub mod processor;
