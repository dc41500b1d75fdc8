pub mod contact;
pub mod document;
pub mod pipe;
pub mod retrieval;
