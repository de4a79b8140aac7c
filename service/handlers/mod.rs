pub mod datasets;
pub mod jobs;
pub mod models;

use ferrite_trainer::page::PageRequest;
use ferrite_trainer::Error;

use crate::util::query::query_usize;

/// `page` / `limit` query parameters, validated.
fn page_request(pairs: &[(String, String)]) -> Result<PageRequest, Error> {
    let page = query_usize(pairs, "page").map_err(Error::Validation)?;
    let limit = query_usize(pairs, "limit").map_err(Error::Validation)?;
    PageRequest::new(page, limit).map_err(Error::Validation)
}
