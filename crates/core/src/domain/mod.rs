pub mod approval;
pub mod approver;
pub mod catalog;
pub mod traveler;
pub mod trip;
