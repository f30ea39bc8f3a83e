pub mod row_cache;
