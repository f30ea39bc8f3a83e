pub mod change_set;
pub mod id_map;
