use bytes::Bytes;

use crate::http::{header::CONTENT_LENGTH, Response, StatusCode};

/// Convert common return types into `Response`.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response {
        self
    }
}

impl IntoResponse for StatusCode {
    fn into_response(self) -> Response {
        response_with_body(self, Bytes::new())
    }
}

pub fn response_with_body(status: StatusCode, body: Bytes) -> Response {
    let length = body.len();
    let mut response = http::Response::new(body);
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_LENGTH, length.into());
    response
}
