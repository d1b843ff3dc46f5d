//! Request paths of the registry protocol.

use tfreg_registry::ModuleCoordinate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Health,
    Discovery,
    ModuleVersions {
        organization: String,
        name: String,
        provider: String,
    },
    ModuleDownload(ModuleCoordinate),
    ModuleArchive(ModuleCoordinate),
    ProviderVersions {
        organization: String,
        provider: String,
    },
    ProviderDownload {
        organization: String,
        provider: String,
        version: String,
        os: String,
        arch: String,
    },
}

impl Route {
    /// Match a GET request URL; anything else is `None`
    pub fn parse(method: &tiny_http::Method, url: &str) -> Option<Route> {
        if *method != tiny_http::Method::Get {
            return None;
        }

        let path = url.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<String> = path
            .trim_matches('/')
            .split('/')
            .map(|s| urlencoding::decode(s).map(|d| d.into_owned()))
            .collect::<Result<_, _>>()
            .ok()?;
        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

        let route = match segments.as_slice() {
            ["health"] => Route::Health,
            [".well-known", "terraform.json"] => Route::Discovery,
            ["terraform", "modules", "v1", "download", org, name, provider, version, "module.zip"] => {
                Route::ModuleArchive(ModuleCoordinate::new(*org, *name, *provider, *version))
            }
            ["terraform", "modules", "v1", org, name, provider, "versions"] => Route::ModuleVersions {
                organization: org.to_string(),
                name: name.to_string(),
                provider: provider.to_string(),
            },
            ["terraform", "modules", "v1", org, name, provider, version, "download"] => {
                Route::ModuleDownload(ModuleCoordinate::new(*org, *name, *provider, *version))
            }
            ["terraform", "providers", "v1", org, provider, "versions"] => Route::ProviderVersions {
                organization: org.to_string(),
                provider: provider.to_string(),
            },
            ["terraform", "providers", "v1", org, provider, version, "download", os, arch] => {
                Route::ProviderDownload {
                    organization: org.to_string(),
                    provider: provider.to_string(),
                    version: version.to_string(),
                    os: os.to_string(),
                    arch: arch.to_string(),
                }
            }
            _ => return None,
        };
        Some(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiny_http::Method;

    fn get(url: &str) -> Option<Route> {
        Route::parse(&Method::Get, url)
    }

    fn vpc(version: &str) -> ModuleCoordinate {
        ModuleCoordinate::new("acme", "vpc", "aws", version)
    }

    #[test]
    fn test_health_and_discovery() {
        assert_eq!(get("/health"), Some(Route::Health));
        assert_eq!(get("/.well-known/terraform.json"), Some(Route::Discovery));
    }

    #[test]
    fn test_module_routes() {
        assert_eq!(
            get("/terraform/modules/v1/acme/vpc/aws/versions"),
            Some(Route::ModuleVersions {
                organization: "acme".to_string(),
                name: "vpc".to_string(),
                provider: "aws".to_string(),
            })
        );
        assert_eq!(
            get("/terraform/modules/v1/acme/vpc/aws/1.2.0/download"),
            Some(Route::ModuleDownload(vpc("1.2.0")))
        );
        assert_eq!(
            get("/terraform/modules/v1/download/acme/vpc/aws/1.2.0/module.zip"),
            Some(Route::ModuleArchive(vpc("1.2.0")))
        );
    }

    #[test]
    fn test_provider_routes() {
        assert_eq!(
            get("/terraform/providers/v1/acme/random/versions"),
            Some(Route::ProviderVersions {
                organization: "acme".to_string(),
                provider: "random".to_string(),
            })
        );
        assert_eq!(
            get("/terraform/providers/v1/acme/random/3.1.0/download/linux/amd64"),
            Some(Route::ProviderDownload {
                organization: "acme".to_string(),
                provider: "random".to_string(),
                version: "3.1.0".to_string(),
                os: "linux".to_string(),
                arch: "amd64".to_string(),
            })
        );
    }

    #[test]
    fn test_query_string_and_trailing_slash() {
        assert_eq!(get("/health?verbose=1"), Some(Route::Health));
        assert_eq!(
            get("/terraform/modules/v1/acme/vpc/aws/versions/"),
            get("/terraform/modules/v1/acme/vpc/aws/versions")
        );
    }

    #[test]
    fn test_percent_decoding() {
        assert_eq!(
            get("/terraform/modules/v1/acme/vpc/aws/1.0.0%2Bbuild/download"),
            Some(Route::ModuleDownload(vpc("1.0.0+build")))
        );
    }

    #[test]
    fn test_unknown_routes() {
        assert_eq!(get("/"), None);
        assert_eq!(get("/terraform/modules/v1/acme/vpc/versions"), None);
        assert_eq!(get("/terraform/modules/v1//vpc/aws/versions"), None);
        assert_eq!(get("/terraform/modules/v1/download/acme/vpc/aws/1.0.0/other.zip"), None);
        assert_eq!(Route::parse(&Method::Post, "/health"), None);
    }
}
