pub mod keyword;
pub mod vector;

pub use keyword::{tokenize, Bm25Store};
pub use vector::FlatVectorStore;
