use crate::config::CONFIG;
use crate::content::DEFAULT_LANGUAGES;
use crate::store::UserConfigStore;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

/// The per-user identity the host platform would normally inject. Anything
/// unauthenticated shares one bucket.
fn user_of(req: &HttpRequest) -> String {
    req.headers()
        .get("X-User")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("anonymous")
        .to_string()
}

#[derive(Deserialize)]
pub struct SaveConf {
    key: String,
    value: String,
}

#[derive(Deserialize)]
pub struct SaveConfs {
    configs: HashMap<String, String>,
}

pub async fn save_conf(
    req: HttpRequest,
    store: web::Data<UserConfigStore>,
    body: web::Json<SaveConf>,
) -> HttpResponse {
    let user = user_of(&req);
    match store.set(&user, &body.key, &body.value) {
        Ok(()) => HttpResponse::Ok().json(json!({ "message": "Saved!" })),
        Err(e) => {
            log::error!("could not persist config for {}: {}", user, e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

pub async fn save_confs(
    req: HttpRequest,
    store: web::Data<UserConfigStore>,
    body: web::Json<SaveConfs>,
) -> HttpResponse {
    let user = user_of(&req);
    match store.set_many(&user, body.into_inner().configs) {
        Ok(()) => HttpResponse::Ok().json(json!({ "message": "Saved!" })),
        Err(e) => {
            log::error!("could not persist configs for {}: {}", user, e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

pub async fn get_conf(
    req: HttpRequest,
    store: web::Data<UserConfigStore>,
    key: web::Path<String>,
) -> HttpResponse {
    let user = user_of(&req);
    let value = store.get(&user, &key);
    HttpResponse::Ok().json(json!({ "value": value, "userid": user }))
}

pub async fn get_confs(req: HttpRequest, store: web::Data<UserConfigStore>) -> HttpResponse {
    let user = user_of(&req);
    HttpResponse::Ok().json(json!({ "values": store.get_all(&user), "userid": user }))
}

pub async fn get_apps() -> HttpResponse {
    let apps = CONFIG.apps.clone().unwrap_or_default();
    HttpResponse::Ok().json(json!({ "apps": apps }))
}

pub async fn get_languages() -> HttpResponse {
    let languages: Vec<String> = CONFIG
        .languages
        .as_deref()
        .map(|list| list.split(',').map(|l| l.trim().to_string()).collect())
        .unwrap_or_else(|| DEFAULT_LANGUAGES.iter().map(|l| l.to_string()).collect());
    HttpResponse::Ok().json(json!({ "languages": languages }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/saveconf", web::put().to(save_conf))
        .route("/saveconfs", web::put().to(save_confs))
        .route("/getconf/{key}", web::get().to(get_conf))
        .route("/getconfs", web::get().to(get_confs))
        .route("/apps", web::get().to(get_apps))
        .route("/lang", web::get().to(get_languages));
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::{call_service, init_service, read_body_json, TestRequest};
    use actix_web::App;
    use serde_json::Value;

    macro_rules! app {
        () => {
            init_service(
                App::new()
                    .app_data(web::Data::new(UserConfigStore::new()))
                    .configure(configure),
            )
            .await
        };
    }

    #[actix_rt::test]
    async fn test_save_and_read_back() {
        let app = app!();

        let save = TestRequest::put()
            .uri("/saveconf")
            .insert_header(("X-User", "alice"))
            .set_json(json!({ "key": "tours-dontShowAgain-notes", "value": "true" }))
            .to_request();
        let response = call_service(&app, save).await;
        assert!(response.status().is_success());
        let body: Value = read_body_json(response).await;
        assert_eq!(body["message"], "Saved!");

        let read = TestRequest::get()
            .uri("/getconf/tours-dontShowAgain-notes")
            .insert_header(("X-User", "alice"))
            .to_request();
        let body: Value = read_body_json(call_service(&app, read).await).await;
        assert_eq!(body["value"], "true");
        assert_eq!(body["userid"], "alice");
    }

    #[actix_rt::test]
    async fn test_unset_key_reads_empty() {
        let app = app!();
        let read = TestRequest::get().uri("/getconf/whatever").to_request();
        let body: Value = read_body_json(call_service(&app, read).await).await;
        assert_eq!(body["value"], "");
        assert_eq!(body["userid"], "anonymous");
    }

    #[actix_rt::test]
    async fn test_users_do_not_leak() {
        let app = app!();

        let save = TestRequest::put()
            .uri("/saveconf")
            .insert_header(("X-User", "alice"))
            .set_json(json!({ "key": "k", "value": "v" }))
            .to_request();
        call_service(&app, save).await;

        let read = TestRequest::get()
            .uri("/getconf/k")
            .insert_header(("X-User", "bob"))
            .to_request();
        let body: Value = read_body_json(call_service(&app, read).await).await;
        assert_eq!(body["value"], "");
    }

    #[actix_rt::test]
    async fn test_bulk_save_and_get_confs() {
        let app = app!();

        let save = TestRequest::put()
            .uri("/saveconfs")
            .insert_header(("X-User", "alice"))
            .set_json(json!({ "configs": { "a": "1", "b": "2" } }))
            .to_request();
        assert!(call_service(&app, save).await.status().is_success());

        let read = TestRequest::get()
            .uri("/getconfs")
            .insert_header(("X-User", "alice"))
            .to_request();
        let body: Value = read_body_json(call_service(&app, read).await).await;
        assert_eq!(body["values"]["a"], "1");
        assert_eq!(body["values"]["b"], "2");
    }

    #[actix_rt::test]
    async fn test_languages_default() {
        let app = app!();
        let read = TestRequest::get().uri("/lang").to_request();
        let body: Value = read_body_json(call_service(&app, read).await).await;
        assert!(body["languages"].as_array().unwrap().len() >= 1);
    }
}
