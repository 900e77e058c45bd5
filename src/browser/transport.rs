use super::page::js_error;
use crate::api::{HttpRequest, HttpResponse, Method, MultipartField, RequestBody, Transport};
use crate::error::TransportError;
use async_trait::async_trait;
use gloo_net::http::Request;
use web_sys::{Blob, BlobPropertyBag, FormData};

/// `fetch` through gloo-net.
#[derive(Debug, Default, Clone, Copy)]
pub struct FetchTransport;

fn request_error(error: gloo_net::Error) -> TransportError {
    TransportError::Request(error.to_string())
}

fn network_error(error: gloo_net::Error) -> TransportError {
    TransportError::Network(error.to_string())
}

fn form_data(fields: Vec<MultipartField>) -> Result<FormData, TransportError> {
    let to_request_error = |e| TransportError::Request(js_error(e).to_string());
    let form = FormData::new().map_err(to_request_error)?;

    for field in fields {
        match field {
            MultipartField::Text { name, value } => {
                form.append_with_str(&name, &value).map_err(to_request_error)?;
            }
            MultipartField::File {
                name,
                bytes,
                mime,
                filename,
            } => {
                let parts = js_sys::Array::of1(&js_sys::Uint8Array::from(bytes.as_slice()));
                let options = BlobPropertyBag::new();
                options.set_type(&mime);
                let blob = Blob::new_with_u8_array_sequence_and_options(&parts, &options).map_err(to_request_error)?;
                form.append_with_blob_and_filename(&name, &blob, &filename)
                    .map_err(to_request_error)?;
            }
        }
    }
    Ok(form)
}

#[async_trait(?Send)]
impl Transport for FetchTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let HttpRequest { method, url, body } = request;

        let response = match (method, body) {
            (Method::Get, _) => Request::get(&url).send().await,
            (Method::Post, RequestBody::Empty) => Request::post(&url).send().await,
            (Method::Post, RequestBody::Json(value)) => Request::post(&url).json(&value).map_err(request_error)?.send().await,
            (Method::Post, RequestBody::Multipart(fields)) => {
                Request::post(&url).body(form_data(fields)?).map_err(request_error)?.send().await
            }
        }
        .map_err(network_error)?;

        let status = response.status();
        let body = response.binary().await.map_err(network_error)?;
        Ok(HttpResponse { status, body })
    }
}
