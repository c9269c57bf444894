//! End-to-end runs of the scraping engine against a mock site.

mod mock_site;
mod orchestration;
