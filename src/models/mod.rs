pub mod approval;
pub mod classification;
pub mod doc_item;
pub mod document;
pub mod enums;
pub mod gl_entry;
pub mod link;
pub mod policy;
pub mod upload;

pub use approval::*;
pub use classification::*;
pub use doc_item::*;
pub use document::*;
pub use gl_entry::*;
pub use link::*;
pub use policy::*;
pub use upload::*;
