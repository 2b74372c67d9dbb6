pub mod stage_pool;
