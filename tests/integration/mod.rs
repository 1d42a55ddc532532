mod concurrency_tests;
mod execution_tests;
mod history_tests;
mod reaper_tests;
