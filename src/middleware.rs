//! Tower middleware binding sessions to requests through a cookie.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::{header, HeaderMap, HeaderValue, Request, Response};
use tokio::sync::Mutex;
use tower::{Layer, Service};
use tower_cookies::cookie::Cookie;
use tower_sessions::Expiry;
use tracing::{debug, warn};

use crate::error::Result;
use crate::manager::Sessions;
use crate::session::Session;

/// Layer installing [`SessionService`] around a service.
///
/// ```
/// use axum::{routing::get, Router};
/// use tower_sessions_cache::{Config, Session, Sessions};
///
/// async fn visits(session: Session) -> String {
///     session.increment("visits", 1).unwrap_or_default().to_string()
/// }
///
/// let sessions = Sessions::new(Config::default());
/// let app: Router = Router::new()
///     .route("/", get(visits))
///     .layer(sessions.layer());
/// ```
#[derive(Debug, Clone)]
pub struct SessionLayer {
    sessions: Sessions,
}

impl SessionLayer {
    pub fn new(sessions: Sessions) -> Self {
        Self { sessions }
    }
}

impl<S> Layer<S> for SessionLayer {
    type Service = SessionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionService {
            inner,
            sessions: self.sessions.clone(),
        }
    }
}

/// Attaches a [`RequestSession`] to each request and writes the session
/// cookie on the response.
#[derive(Debug, Clone)]
pub struct SessionService<S> {
    inner: S,
    sessions: Sessions,
}

impl<ReqBody, ResBody, S> Service<Request<ReqBody>> for SessionService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
    ResBody: Send,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        // The readied service is the one that must be called.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let sessions = self.sessions.clone();

        Box::pin(async move {
            let token = sessions.token_from_headers(req.headers());
            let request_session = RequestSession::new(sessions, token);
            req.extensions_mut().insert(request_session.clone());

            let mut res = inner.call(req).await?;
            request_session.finish(res.headers_mut()).await;
            Ok(res)
        })
    }
}

/// The session state of a single request.
///
/// Every [`start`](RequestSession::start) within one request returns the same
/// [`Session`], so values set by an earlier handler stage are visible to later
/// ones.
#[derive(Debug, Clone)]
pub struct RequestSession {
    inner: Arc<RequestInner>,
}

#[derive(Debug)]
struct RequestInner {
    sessions: Sessions,
    token: Option<String>,
    current: Mutex<Option<Session>>,
    destroyed: AtomicBool,
}

impl RequestSession {
    pub(crate) fn new(sessions: Sessions, token: Option<String>) -> Self {
        Self {
            inner: Arc::new(RequestInner {
                sessions,
                token,
                current: Mutex::new(None),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    /// The token carried by the request cookie, if any.
    pub fn token(&self) -> Option<&str> {
        self.inner.token.as_deref()
    }

    /// Resolves the request's session, creating one if the cookie carries no
    /// live token.
    ///
    /// The returned handle reports [`Session::is_new`] only when this request
    /// created the session.
    pub async fn start(&self) -> Result<Session> {
        let mut current = self.inner.current.lock().await;
        if let Some(session) = current.as_ref().filter(|session| !session.is_destroyed()) {
            return Ok(session.clone());
        }

        let session = self.inner.sessions.start(self.token()).await?;
        *current = Some(session.clone());
        Ok(session)
    }

    /// The session started by this request so far, if any.
    pub async fn session(&self) -> Option<Session> {
        self.inner.current.lock().await.clone()
    }

    /// Destroys the request's session and expires the cookie.
    ///
    /// A later [`start`](RequestSession::start) in the same request begins a
    /// fresh session.
    pub async fn destroy(&self) {
        let mut current = self.inner.current.lock().await;
        if let Some(session) = current.take() {
            self.inner.sessions.destroy(&session);
        }
        if let Some(token) = self.token() {
            self.inner.sessions.destroy_by_id(token);
        }
        self.inner.destroyed.store(true, Ordering::Release);
    }

    async fn finish(&self, headers: &mut HeaderMap) {
        let sessions = &self.inner.sessions;
        let current = self.inner.current.lock().await.clone();
        let destroyed = self.inner.destroyed.load(Ordering::Acquire);

        let cookie = match current {
            Some(session) if session.is_destroyed() => Some(removal_cookie(sessions)),
            Some(session) if session.is_new() => {
                if session.has_data() {
                    debug!(token = %session.id(), "issuing session cookie");
                    Some(session_cookie(sessions, session.id()))
                } else {
                    sessions.discard(&session);
                    destroyed.then(|| removal_cookie(sessions))
                }
            }
            Some(session) => match sessions.config().expiry() {
                Expiry::OnInactivity(_) => Some(session_cookie(sessions, session.id())),
                _ => None,
            },
            None => destroyed.then(|| removal_cookie(sessions)),
        };

        if let Some(cookie) = cookie {
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    headers.append(header::SET_COOKIE, value);
                }
                Err(err) => warn!(error = %err, "session cookie is not a valid header value"),
            }
        }
    }
}

fn session_cookie(sessions: &Sessions, token: &str) -> Cookie<'static> {
    let config = sessions.config();
    let mut builder = Cookie::build((config.cookie_name().to_string(), token.to_string()))
        .path(config.path().to_string())
        .http_only(config.http_only())
        .secure(config.secure())
        .same_site(config.same_site());
    if let Some(max_age) = config.cookie_max_age() {
        builder = builder.max_age(max_age);
    }
    if let Some(domain) = config.domain() {
        builder = builder.domain(domain.to_string());
    }
    builder.build()
}

fn removal_cookie(sessions: &Sessions) -> Cookie<'static> {
    let mut cookie = session_cookie(sessions, "");
    cookie.make_removal();
    cookie
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use axum::body::Body;
    use time::Duration;
    use tower::{ServiceBuilder, ServiceExt};
    use tower_cookies::cookie::SameSite;

    use super::*;
    use crate::Config;

    async fn handler(req: Request<Body>) -> Result<Response<Body>, Infallible> {
        let request_session = req
            .extensions()
            .get::<RequestSession>()
            .cloned()
            .expect("request includes RequestSession extension");

        let session = request_session.start().await.expect("session starts");
        session.set("foo", 42).expect("session set succeeds");

        Ok(Response::new(Body::empty()))
    }

    async fn noop_handler(_: Request<Body>) -> Result<Response<Body>, Infallible> {
        Ok(Response::new(Body::empty()))
    }

    async fn start_only_handler(req: Request<Body>) -> Result<Response<Body>, Infallible> {
        let request_session = req
            .extensions()
            .get::<RequestSession>()
            .cloned()
            .expect("request includes RequestSession extension");
        request_session.start().await.expect("session starts");
        Ok(Response::new(Body::empty()))
    }

    fn get_session_cookie(res: &Response<Body>) -> Cookie<'static> {
        let set_cookie = res
            .headers()
            .get(header::SET_COOKIE)
            .expect("response includes set-cookie header")
            .to_str()
            .expect("set-cookie header is valid utf-8");
        Cookie::parse(set_cookie.to_string()).expect("set-cookie parses successfully")
    }

    #[tokio::test]
    async fn issues_cookie_for_new_session_with_data() {
        let sessions = Sessions::new(Config::default());
        let svc = ServiceBuilder::new()
            .layer(sessions.layer())
            .service_fn(handler);

        let req = Request::builder().body(Body::empty()).unwrap();
        let res = svc.oneshot(req).await.unwrap();
        let cookie = get_session_cookie(&res);

        assert_eq!(cookie.name(), crate::config::DEFAULT_COOKIE_NAME);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn no_cookie_without_session_use() {
        let sessions = Sessions::new(Config::default());
        let svc = ServiceBuilder::new()
            .layer(sessions.layer())
            .service_fn(noop_handler);

        let req = Request::builder().body(Body::empty()).unwrap();
        let res = svc.oneshot(req).await.unwrap();
        assert!(res.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn empty_new_sessions_are_discarded() {
        let sessions = Sessions::new(Config::default());
        let svc = ServiceBuilder::new()
            .layer(sessions.layer())
            .service_fn(start_only_handler);

        let req = Request::builder().body(Body::empty()).unwrap();
        let res = svc.oneshot(req).await.unwrap();
        assert!(res.headers().get(header::SET_COOKIE).is_none());
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn bogus_cookie_gets_a_new_token() {
        let sessions = Sessions::new(Config::default().with_cookie_name("sid"));
        let svc = ServiceBuilder::new()
            .layer(sessions.layer())
            .service_fn(handler);

        let req = Request::builder()
            .header(header::COOKIE, "sid=bogus")
            .body(Body::empty())
            .unwrap();
        let res = svc.oneshot(req).await.unwrap();
        let cookie = get_session_cookie(&res);
        assert_ne!(cookie.value(), "bogus");
    }

    #[tokio::test]
    async fn existing_session_is_refreshed_on_inactivity_expiry() {
        let sessions =
            Sessions::new(Config::default().with_expiry(Expiry::OnInactivity(Duration::hours(2))));
        let session = sessions.start(None).await.unwrap();
        session.set("foo", 1).unwrap();

        let svc = ServiceBuilder::new()
            .layer(sessions.layer())
            .service_fn(start_only_handler);
        let req = Request::builder()
            .header(
                header::COOKIE,
                format!("{}={}", crate::config::DEFAULT_COOKIE_NAME, session.id()),
            )
            .body(Body::empty())
            .unwrap();
        let res = svc.oneshot(req).await.unwrap();
        let cookie = get_session_cookie(&res);

        assert_eq!(cookie.value(), session.id());
        assert_eq!(cookie.max_age(), Some(Duration::hours(2)));
    }

    #[tokio::test]
    async fn existing_session_is_not_reissued_on_session_end_expiry() {
        let sessions = Sessions::new(Config::default().with_expiry(Expiry::OnSessionEnd));
        let session = sessions.start(None).await.unwrap();
        session.set("foo", 1).unwrap();

        let svc = ServiceBuilder::new()
            .layer(sessions.layer())
            .service_fn(handler);
        let req = Request::builder()
            .header(
                header::COOKIE,
                format!("{}={}", crate::config::DEFAULT_COOKIE_NAME, session.id()),
            )
            .body(Body::empty())
            .unwrap();
        let res = svc.oneshot(req).await.unwrap();
        assert!(res.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn returning_session_emptied_by_a_request_is_kept() {
        let sessions = Sessions::new(Config::default().with_expiry(Expiry::OnSessionEnd));
        let existing = sessions.start(None).await.unwrap();
        existing.set("foo", 1).unwrap();
        existing.set_flash("notice", "saved").unwrap();

        let request_session = RequestSession::new(sessions.clone(), Some(existing.id().to_string()));
        let session = request_session.start().await.unwrap();
        assert!(!session.is_new());
        session.clear();
        session.get_flashes();

        let mut headers = HeaderMap::new();
        request_session.finish(&mut headers).await;
        assert!(headers.get(header::SET_COOKIE).is_none());
        assert_eq!(sessions.len(), 1);

        let again = sessions.start(Some(existing.id())).await.unwrap();
        assert!(again.ptr_eq(&existing));
    }

    #[tokio::test]
    async fn configured_cookie_attributes() {
        let config = Config::default()
            .with_cookie_name("my.sid")
            .with_secure(true)
            .with_http_only(false)
            .with_same_site(SameSite::Strict)
            .with_path("/app")
            .with_domain("example.com")
            .with_expiry(Expiry::OnSessionEnd);
        let sessions = Sessions::new(config);
        let svc = ServiceBuilder::new()
            .layer(sessions.layer())
            .service_fn(handler);

        let req = Request::builder().body(Body::empty()).unwrap();
        let res = svc.oneshot(req).await.unwrap();
        let cookie = get_session_cookie(&res);

        assert_eq!(cookie.name(), "my.sid");
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.http_only(), None);
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.path(), Some("/app"));
        assert_eq!(cookie.domain(), Some("example.com"));
        assert!(cookie.max_age().is_none());
    }

    #[tokio::test]
    async fn start_is_memoized_per_request() {
        let sessions = Sessions::new(Config::default());
        let request_session = RequestSession::new(sessions.clone(), None);

        let first = request_session.start().await.unwrap();
        let second = request_session.start().await.unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn destroy_expires_cookie() {
        let sessions = Sessions::new(Config::default());
        let existing = sessions.start(None).await.unwrap();
        existing.set("foo", 1).unwrap();

        let request_session = RequestSession::new(sessions.clone(), Some(existing.id().to_string()));
        request_session.start().await.unwrap();
        request_session.destroy().await;
        assert!(existing.is_destroyed());

        let fresh = request_session.start().await.unwrap();
        assert_ne!(fresh.id(), existing.id());

        let mut headers = HeaderMap::new();
        request_session.finish(&mut headers).await;
        let set_cookie = headers
            .get(header::SET_COOKIE)
            .expect("removal cookie is sent")
            .to_str()
            .unwrap();
        let cookie = Cookie::parse(set_cookie.to_string()).unwrap();
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
        assert!(sessions.is_empty());
    }
}
