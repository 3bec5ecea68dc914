use thiserror::Error;

/// Screens the console redirects to when the backend rejects a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Unauthorized,
    NotFound,
}

impl Route {
    pub fn title(self) -> &'static str {
        match self {
            Route::Unauthorized => "Unauthorized",
            Route::NotFound => "Not found",
        }
    }
}

/// What the user is shown after a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Redirect { route: Route, message: String },
    Toast(String),
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Notice::Redirect { message, .. } | Notice::Toast(message) => message,
        }
    }

    pub fn route(&self) -> Option<Route> {
        match self {
            Notice::Redirect { route, .. } => Some(*route),
            Notice::Toast(_) => None,
        }
    }
}

pub const NETWORK_ERROR_MESSAGE: &str =
    "Erro de rede. Por favor, verifique sua conexão ou tente novamente mais tarde.";

pub fn notice_for_status(status: u16) -> Notice {
    match status {
        401 => Notice::Redirect {
            route: Route::Unauthorized,
            message: "Você não tem permissão para acessar esta página".to_string(),
        },
        404 | 502 | 503 | 504 => Notice::Redirect {
            route: Route::NotFound,
            message: "Página não encontrada".to_string(),
        },
        other => Notice::Toast(format!(
            "Erro ao tentar executar a operação. Código de erro: {other}"
        )),
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl ApiError {
    pub fn notice(&self) -> Notice {
        match self {
            ApiError::Status { status, .. } => notice_for_status(*status),
            ApiError::Network(_) => Notice::Toast(NETWORK_ERROR_MESSAGE.to_string()),
            ApiError::Decode { path, .. } => {
                Notice::Toast(format!("Resposta inválida do servidor ({path})"))
            }
            ApiError::InvalidUrl { url, .. } => Notice::Toast(format!("URL inválido: {url}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unauthorized_redirects() {
        let notice = notice_for_status(401);
        assert_eq!(notice.route(), Some(Route::Unauthorized));
        assert_eq!(
            notice.message(),
            "Você não tem permissão para acessar esta página"
        );
    }

    #[test]
    fn gateway_failures_redirect_to_not_found() {
        for status in [404, 502, 503, 504] {
            let notice = notice_for_status(status);
            assert_eq!(notice.route(), Some(Route::NotFound), "status {status}");
            assert_eq!(notice.message(), "Página não encontrada");
        }
    }

    #[test]
    fn other_statuses_toast_with_code() {
        let notice = ApiError::Status {
            status: 500,
            body: "boom".to_string(),
        }
        .notice();
        assert_eq!(
            notice,
            Notice::Toast("Erro ao tentar executar a operação. Código de erro: 500".to_string())
        );
        assert_eq!(notice_for_status(400).route(), None);
    }
}
