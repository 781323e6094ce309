pub mod automaton;
pub mod resource;
