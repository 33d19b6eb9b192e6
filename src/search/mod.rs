pub mod hybrid;
