pub mod release_index;
