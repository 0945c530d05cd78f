pub mod normalized_record;
