pub mod constraint;
