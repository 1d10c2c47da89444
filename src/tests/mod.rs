mod filter;
mod mode;
