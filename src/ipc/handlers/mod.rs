pub mod classes;
pub mod contact;
pub mod core;
pub mod enrollments;
pub mod qr;
pub mod students;
pub mod users;
