pub mod andersen_solver;
pub mod constraint_generator;
