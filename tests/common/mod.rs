#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use time::Duration;
use tower::ServiceExt;
use tower_sessions_cache::SameSite;

pub use tower_cookies::cookie::Cookie;

/// A response with its body collected.
pub struct Reply {
    pub status: StatusCode,
    pub cookies: Vec<Cookie<'static>>,
    pub body: Bytes,
}

impl Reply {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("body is json")
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.body.to_vec()).expect("body is utf-8")
    }

    pub fn removes_cookie(&self) -> bool {
        self.cookies
            .iter()
            .any(|cookie| cookie.max_age() == Some(Duration::ZERO))
    }
}

/// Drives a router like a browser: the session cookie issued by one response
/// is sent with the next request, and dropped when the server expires it.
pub struct Client {
    app: Router,
    cookie: Option<Cookie<'static>>,
}

impl Client {
    pub fn new(app: Router) -> Self {
        Self { app, cookie: None }
    }

    pub fn cookie(&self) -> Option<&Cookie<'static>> {
        self.cookie.as_ref()
    }

    pub fn set_cookie(&mut self, cookie: Option<Cookie<'static>>) {
        self.cookie = cookie;
    }

    pub async fn get(&mut self, uri: &str) -> Reply {
        self.send(Method::GET, uri, Body::empty(), None).await
    }

    pub async fn post_json(&mut self, uri: &str, json: &Value) -> Reply {
        self.send(
            Method::POST,
            uri,
            Body::from(json.to_string()),
            Some("application/json"),
        )
        .await
    }

    pub async fn post_raw(&mut self, uri: &str, body: &'static str) -> Reply {
        self.send(Method::POST, uri, Body::from(body), Some("application/json"))
            .await
    }

    async fn send(
        &mut self,
        method: Method,
        uri: &str,
        body: Body,
        content_type: Option<&str>,
    ) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie.stripped().to_string());
        }
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        let req = builder.body(body).expect("request builds successfully");

        let res = self
            .app
            .clone()
            .oneshot(req)
            .await
            .expect("service call succeeds");

        let status = res.status();
        let cookies: Vec<Cookie<'static>> = res
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|value| {
                let value = value.to_str().expect("set-cookie header is valid utf-8");
                Cookie::parse(value.to_string()).expect("set-cookie parses successfully")
            })
            .collect();
        let body = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .expect("body is readable");

        for cookie in &cookies {
            if cookie.max_age() == Some(Duration::ZERO) {
                self.cookie = None;
            } else {
                self.cookie = Some(cookie.clone());
            }
        }

        Reply {
            status,
            cookies,
            body,
        }
    }
}

pub fn assert_session_cookie(cookie: &Cookie<'_>, name: &str) {
    assert_eq!(cookie.name(), name);
    assert!(!cookie.value().is_empty());
    assert_eq!(cookie.same_site(), Some(SameSite::Lax));
}
