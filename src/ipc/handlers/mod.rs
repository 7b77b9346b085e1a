pub mod classroom;
pub mod core;
pub mod reports;
pub mod student;
pub mod teacher;
