pub mod bingx;
