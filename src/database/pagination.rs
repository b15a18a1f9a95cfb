use serde::{Deserialize, Serialize};

use super::{
    error::{Error, ErrorKind},
    form::QueryParams,
};
use crate::constants::MAX_PAGE_SIZE;

/// `page` is 1-based, `limit` is the page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    pub fn new(page: i64, limit: i64) -> Self {
        Self { page, limit }
    }

    pub fn from_query(params: &QueryParams, default_limit: i64) -> Result<Self, Error> {
        let page = params.get_number::<i64>("page")?.unwrap_or(1);
        if page < 1 {
            return Err(ErrorKind::NotFound.new("Invalid page."));
        }

        let limit = params
            .get_number::<i64>("limit")?
            .unwrap_or(default_limit)
            .clamp(1, MAX_PAGE_SIZE);

        // Pages whose offset does not fit in an i64 cannot hold any rows.
        if (page - 1).checked_mul(limit).is_none() {
            return Err(ErrorKind::NotFound.new("Invalid page."));
        }

        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct PageContext<T> {
    pub count: i64,
    pub next: Option<i64>,
    pub previous: Option<i64>,
    pub results: Vec<T>,
}

impl<T> PageContext<T> {
    /// An empty page past the first one is an error; an empty first page is a valid result.
    pub fn from_rows(rows: Vec<T>, total_rows: i64, request: &PageRequest) -> Result<Self, Error> {
        if rows.is_empty() {
            if request.page > 1 {
                return Err(ErrorKind::NotFound.new("Invalid page."));
            }
            return Ok(Self::no_rows());
        }

        let next = if request
            .page
            .checked_mul(request.limit)
            .is_some_and(|seen| seen < total_rows)
        {
            Some(request.page + 1)
        } else {
            None
        };
        let previous = if request.page > 1 {
            Some(request.page - 1)
        } else {
            None
        };

        Ok(Self {
            count: total_rows,
            next,
            previous,
            results: rows,
        })
    }

    pub fn no_rows() -> Self {
        Self {
            count: 0,
            next: None,
            previous: None,
            results: vec![],
        }
    }
}
