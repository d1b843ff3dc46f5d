//! Registry protocol over tiny_http.
//!
//! Requests are accepted on the calling thread and handled as tasks on the
//! given runtime, so a slow materialization never blocks other clients.

mod reply;
mod routes;

use reply::Reply;
use routes::Route;

use std::sync::Arc;
use tfreg_registry::RegistryService;
use tiny_http::{Request, Server};
use tokio::runtime::Handle;

/// Accept requests until the server is shut down
pub fn serve(server: Server, service: Arc<RegistryService>, runtime: Handle) {
    for request in server.incoming_requests() {
        let service = service.clone();
        runtime.spawn(async move {
            handle(&service, request).await;
        });
    }
}

async fn handle(service: &RegistryService, request: Request) {
    let method = request.method().to_string();
    let url = request.url().to_string();

    let reply = match Route::parse(request.method(), &url) {
        Some(route) => dispatch(service, route).await,
        None => Reply::error(404, &format!("No route for {} {}", method, url)),
    };

    let status = reply.status();
    match reply.send(request).await {
        Ok(()) => log::info!("{} {} - {}", method, url, status),
        Err(e) => log::warn!("{} {} - {} (response aborted: {})", method, url, status, e),
    }
}

async fn dispatch(service: &RegistryService, route: Route) -> Reply {
    match route {
        Route::Health => Reply::json(200, &serde_json::json!({ "status": "UP" })),
        Route::Discovery => Reply::json(200, &reply::discovery_body()),
        Route::ModuleVersions {
            organization,
            name,
            provider,
        } => match service.module_versions(&organization, &name, &provider).await {
            Ok(versions) => Reply::json(200, &reply::module_versions_body(&versions)),
            Err(e) => Reply::from_error(&e),
        },
        Route::ModuleDownload(coordinate) => match service.module_download_path(&coordinate).await {
            Ok(location) => Reply::Download { location },
            Err(e) => Reply::from_error(&e),
        },
        Route::ModuleArchive(coordinate) => match service.open_archive(&coordinate).await {
            Ok(stream) => Reply::Archive {
                file_name: coordinate.archive_file_name(),
                stream,
            },
            Err(e) => Reply::from_error(&e),
        },
        Route::ProviderVersions {
            organization,
            provider,
        } => match service.provider_versions(&organization, &provider).await {
            Ok(versions) => Reply::json(200, &reply::provider_versions_body(&versions)),
            Err(e) => Reply::from_error(&e),
        },
        Route::ProviderDownload {
            organization,
            provider,
            version,
            os,
            arch,
        } => match service
            .provider_file(&organization, &provider, &version, &os, &arch)
            .await
        {
            Ok(file) => Reply::json(200, &file),
            Err(e) => Reply::from_error(&e),
        },
    }
}
