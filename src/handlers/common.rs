use crate::errors::ServiceError;
use crate::repositories::Page;
use crate::services::export::{self, ExportFormat};
use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Largest page size any list endpoint will serve
pub const MAX_PER_PAGE: u64 = 100;

/// JSON body extractor whose rejections use the API error body.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

pub fn no_content_response() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// File download with an attachment disposition
pub fn download_response(file_name: &str, content_type: &'static str, body: Vec<u8>) -> Response {
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}

/// Spreadsheet download named `{prefix}_{timestamp}.{csv|xlsx}`
pub fn export_response(prefix: &str, format: ExportFormat, body: Vec<u8>) -> Response {
    download_response(
        &export::attachment_name(prefix, format),
        format.content_type(),
        body,
    )
}

/// Pagination parameters for list operations
#[derive(Debug, Clone, Copy, Deserialize, Serialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl PaginationParams {
    /// Page numbers start at 1; page size is kept within 1..=MAX_PER_PAGE.
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, MAX_PER_PAGE),
        }
    }
}

/// Paginated list body
#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn from_page(page: Page<T>, params: PaginationParams) -> Self {
        let pages = page.pages(params.per_page);
        Self {
            items: page.items,
            total: page.total,
            page: params.page,
            per_page: params.per_page,
            pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0, 1, 1)]
    #[case(3, 20, 3, 20)]
    #[case(1, 500, 1, 100)]
    fn pagination_is_clamped(
        #[case] page: u64,
        #[case] per_page: u64,
        #[case] want_page: u64,
        #[case] want_per_page: u64,
    ) {
        let params = PaginationParams { page, per_page }.normalized();
        assert_eq!(params.page, want_page);
        assert_eq!(params.per_page, want_per_page);
    }

    #[test]
    fn paginated_response_counts_pages() {
        let page = Page {
            items: vec![1, 2],
            total: 42,
        };
        let body = PaginatedResponse::from_page(page, PaginationParams::default());
        assert_eq!(body.pages, 3);
        assert_eq!(body.items, vec![1, 2]);
    }

    #[test]
    fn downloads_are_attachments() {
        let response = download_response("reports.csv", "text/csv; charset=utf-8", b"a,b\n".to_vec());
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"reports.csv\""
        );
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv; charset=utf-8");
    }
}
