pub mod field;
pub mod work_item;
