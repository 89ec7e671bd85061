pub mod class;
pub mod employee;
pub mod fees;
pub mod institute;
pub mod skill_rating;
pub mod sms;
pub mod student;
