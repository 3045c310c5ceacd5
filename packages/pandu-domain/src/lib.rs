pub mod access;
pub mod sparse;

mod stopwords;
