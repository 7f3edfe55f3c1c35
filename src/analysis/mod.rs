pub mod categories;
pub mod keywords;
pub mod sections;
