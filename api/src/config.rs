use ipnetwork::IpNetwork;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Env {
    Dev,
    Staging,
    Production,
}

pub struct ServerConfig {
    pub env: Env,
    pub port: u16,
    /// Public origin of the site the comment widget is served from. Used for
    /// magic-link redirect targets and the CORS allow-list.
    pub site_url: String,
    pub cms: Option<CmsConfig>,
    pub auth: Option<AuthConfig>,
    pub trusted_proxies: Vec<IpNetwork>,
}

/// Write/read access to the headless CMS that stores comment documents.
/// Absent when the deployment has no write token, in which case the comment
/// endpoints answer 503.
pub struct CmsConfig {
    pub project_id: String,
    pub dataset: String,
    pub api_version: String,
    pub write_token: String,
}

/// Hosted passwordless-auth service. Absent means no identity ever resolves
/// and every authenticated endpoint answers 401.
pub struct AuthConfig {
    pub base_url: String,
    pub anon_key: String,
}

const DEFAULT_CMS_API_VERSION: &str = "2024-10-01";

fn var(key: &str) -> Result<Option<String>, String> {
    match std::env::var(key) {
        Ok(env) => Ok(Some(env)),
        Err(e) => match e {
            std::env::VarError::NotPresent => Ok(None),
            std::env::VarError::NotUnicode(_) => Err(format!(
                "Could not get the environment variable `{key}` due to unicode error"
            )),
        },
    }
}

fn required_var(key: &str) -> String {
    let val = var(key);
    match val {
        Ok(val) => match val {
            Some(val) => val,
            None => {
                tracing::error!("Environment variable `{key}` is required");
                std::process::exit(1)
            }
        },
        Err(e) => {
            tracing::error!(
                "Environment variable `{key}` is required, but could not retrieve: {e}"
            );
            std::process::exit(1)
        }
    }
}

/// Either all or none variables are set
fn all_or_none_vars(keys: Vec<&str>) -> Option<Vec<String>> {
    keys.iter().fold(None, |accum, k| match var(k) {
        Ok(Some(val)) => match accum {
            Some(mut l) => {
                l.push(val);
                Some(l)
            }
            None => Some(vec![val]),
        },
        _ => match accum {
            Some(_) => {
                tracing::error!(
                    "Environment variable `{k}` is required if variables {keys:?} are present"
                );
                None
            }
            None => None,
        },
    })
}

/// Comma-separated CIDR list. Entries that don't parse are dropped with a
/// warning rather than failing startup.
fn parse_proxy_list(raw: &str) -> Vec<IpNetwork> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<IpNetwork>() {
            Ok(network) => Some(network),
            Err(error) => {
                tracing::warn!(%error, entry = %s, "Bad CIDR in TRUSTED_PROXY_CIDRS");
                None
            }
        })
        .collect()
}

impl ServerConfig {
    pub fn new_from_env() -> Self {
        let cms = all_or_none_vars(vec!["CMS_PROJECT_ID", "CMS_DATASET", "CMS_WRITE_TOKEN"]).map(
            |mut vars| CmsConfig {
                project_id: vars.remove(0),
                dataset: vars.remove(0),
                write_token: vars.remove(0),
                api_version: var("CMS_API_VERSION")
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| DEFAULT_CMS_API_VERSION.into()),
            },
        );

        let auth = all_or_none_vars(vec!["AUTH_URL", "AUTH_ANON_KEY"]).map(|mut vars| AuthConfig {
            base_url: vars.remove(0).trim_end_matches('/').to_string(),
            anon_key: vars.remove(0),
        });

        let trusted_proxies = var("TRUSTED_PROXY_CIDRS")
            .ok()
            .flatten()
            .map(|raw| parse_proxy_list(&raw))
            .unwrap_or_default();

        ServerConfig {
            env: match var("ENVIRONMENT") {
                Ok(Some(env)) => match env.as_str() {
                    "dev" => Env::Dev,
                    "staging" => Env::Staging,
                    "production" => Env::Production,
                    _ => Env::Dev,
                },
                _ => Env::Dev,
            },
            port: var("PORT")
                .ok()
                .flatten()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            site_url: required_var("SITE_URL").trim_end_matches('/').to_string(),
            cms,
            auth,
            trusted_proxies,
        }
    }
}
