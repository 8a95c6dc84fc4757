pub mod measurement;
pub mod price;
pub mod quotation;
pub mod selection;
pub mod template;
pub mod variant;
