//! Authorization endpoint with PKCE
//!
//! `GET /oauth/authorize` renders the consent form; `POST` authenticates
//! the resource owner and, on approval, issues an authorization code and
//! redirects back to the client. Validation failures on client identity
//! or redirect URI never redirect - redirecting an unvalidated URI is an
//! open-redirect hole.

use super::OAuthState;
use crate::models::OAuthErrorBody;
use crate::pkce::{CodeChallengeMethod, validate_code_challenge, validate_code_verifier};
use crate::scope::ScopeSet;
use axum::{
    Form, Json,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect},
};
use serde::Deserialize;

/// Authorization request query parameters.
#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    /// Must be `code`.
    pub response_type: String,
    /// Registered client identifier.
    pub client_id: String,
    /// Must exactly match a registered redirect URI.
    pub redirect_uri: String,
    /// Opaque CSRF value echoed back to the client.
    pub state: Option<String>,
    /// Space-separated requested scopes.
    pub scope: Option<String>,
    /// PKCE code challenge; mandatory for public clients.
    pub code_challenge: Option<String>,
    /// `S256` (default) or `plain`.
    pub code_challenge_method: Option<String>,
}

/// Consent form submission.
#[derive(Debug, Deserialize)]
pub struct AuthorizeForm {
    /// Client identifier from the original request.
    pub client_id: String,
    /// Redirect URI from the original request.
    pub redirect_uri: String,
    /// State from the original request.
    pub state: Option<String>,
    /// Requested scopes.
    pub scope: Option<String>,
    /// PKCE code challenge.
    pub code_challenge: Option<String>,
    /// PKCE challenge method.
    pub code_challenge_method: Option<String>,
    /// Resource owner login.
    pub username: String,
    /// Resource owner password.
    pub password: String,
    /// `"true"` when the user approved.
    pub approved: String,
}

type AuthorizeError = (StatusCode, Json<OAuthErrorBody>);

fn bad_request(body: OAuthErrorBody) -> AuthorizeError {
    (StatusCode::BAD_REQUEST, Json(body))
}

/// `GET /oauth/authorize` - validate the request and show the consent
/// form.
pub async fn authorize_get(
    State(state): State<OAuthState>,
    Query(params): Query<AuthorizeRequest>,
) -> Result<impl IntoResponse, AuthorizeError> {
    validate_authorize_request(&state, &params)?;
    Ok(Html(render_consent_form(&state, &params)))
}

/// `POST /oauth/authorize` - consent decision.
pub async fn authorize_post(
    State(state): State<OAuthState>,
    Form(form): Form<AuthorizeForm>,
) -> Result<impl IntoResponse, AuthorizeError> {
    // Client and redirect URI must validate before anything is allowed
    // to redirect there.
    if state.registry.get(&form.client_id).is_none() {
        return Err(bad_request(OAuthErrorBody::invalid_client("unknown client")));
    }
    if !state
        .registry
        .redirect_uri_allowed(&form.client_id, &form.redirect_uri)
    {
        return Err(bad_request(OAuthErrorBody::invalid_request(
            "redirect_uri is not registered for this client",
        )));
    }

    // Query values go through percent-encoding; a state containing `&`
    // or `#` must survive the round trip intact.
    let state_suffix = form
        .state
        .as_ref()
        .map(|s| format!("&state={}", urlencoding::encode(s)))
        .unwrap_or_default();

    if form.approved != "true" {
        let redirect = format!(
            "{}?error=access_denied&error_description={}{state_suffix}",
            form.redirect_uri,
            urlencoding::encode("User denied authorization"),
        );
        return Ok(Redirect::to(&redirect).into_response());
    }

    let Some(user) = state.users.authenticate(&form.username, &form.password) else {
        tracing::warn!(
            client_id = form.client_id,
            username = form.username,
            "consent submitted with bad resource-owner credentials"
        );
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(OAuthErrorBody::new(
                "access_denied",
                "resource owner authentication failed",
            )),
        ));
    };

    let method = parse_challenge_method(form.code_challenge_method.as_deref())
        .map_err(bad_request)?;
    let scope = ScopeSet::parse(form.scope.as_deref().unwrap_or_default());

    let code = state
        .engine
        .issue_code(
            &form.client_id,
            &user.user_id,
            scope,
            &form.redirect_uri,
            form.code_challenge.clone(),
            method,
        )
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(e.body())))?;

    let redirect = format!("{}?code={code}{state_suffix}", form.redirect_uri);
    Ok(Redirect::to(&redirect).into_response())
}

fn parse_challenge_method(
    raw: Option<&str>,
) -> Result<CodeChallengeMethod, OAuthErrorBody> {
    match raw {
        None => Ok(CodeChallengeMethod::S256),
        Some(raw) => raw.parse().map_err(|()| {
            OAuthErrorBody::invalid_request("code_challenge_method must be 'S256' or 'plain'")
        }),
    }
}

fn validate_authorize_request(
    state: &OAuthState,
    params: &AuthorizeRequest,
) -> Result<(), AuthorizeError> {
    let Some(client) = state.registry.get(&params.client_id) else {
        return Err(bad_request(OAuthErrorBody::invalid_client("unknown client")));
    };

    if !state
        .registry
        .redirect_uri_allowed(&params.client_id, &params.redirect_uri)
    {
        return Err(bad_request(OAuthErrorBody::invalid_request(
            "redirect_uri is not registered for this client",
        )));
    }

    if params.response_type != "code" {
        return Err(bad_request(OAuthErrorBody::invalid_request(
            "response_type must be 'code'",
        )));
    }

    let scope = ScopeSet::parse(params.scope.as_deref().unwrap_or_default());
    if !state.registry.scope_allowed(&params.client_id, &scope) {
        return Err(bad_request(OAuthErrorBody::invalid_scope(
            "requested scope exceeds client allowance",
        )));
    }

    let method = parse_challenge_method(params.code_challenge_method.as_deref())
        .map_err(bad_request)?;

    match &params.code_challenge {
        Some(challenge) => {
            let well_formed = match method {
                CodeChallengeMethod::S256 => validate_code_challenge(challenge),
                // A plain challenge is the verifier itself and must meet
                // the same format rules.
                CodeChallengeMethod::Plain => validate_code_verifier(challenge),
            };
            if !well_formed {
                return Err(bad_request(OAuthErrorBody::invalid_request(
                    "Invalid code_challenge format",
                )));
            }
        }
        None if client.is_public() => {
            // Public clients have no secret; the code must be PKCE-bound.
            return Err(bad_request(OAuthErrorBody::invalid_request(
                "code_challenge is required for public clients",
            )));
        }
        None => {}
    }

    Ok(())
}

/// Minimal HTML entity escaping for values reflected into the consent
/// page. Request parameters are attacker-controlled.
fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn render_consent_form(state: &OAuthState, params: &AuthorizeRequest) -> String {
    let client_name = escape_html(
        &state
            .registry
            .get(&params.client_id)
            .map(|c| c.client_name.clone())
            .unwrap_or_else(|| params.client_id.clone()),
    );

    let scopes = params
        .scope
        .as_deref()
        .map(|s| s.split_whitespace().collect::<Vec<_>>())
        .unwrap_or_default();

    let scope_list = if scopes.is_empty() {
        "<p>No specific permissions requested</p>".to_string()
    } else {
        scopes
            .iter()
            .map(|s| format!("<div class='scope-item'>&bull; {}</div>", escape_html(s)))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let hidden = |name: &str, value: Option<&str>| {
        value
            .map(|v| {
                format!(
                    r#"<input type="hidden" name="{name}" value="{}">"#,
                    escape_html(v)
                )
            })
            .unwrap_or_default()
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Authorization Request</title>
    <style>
        body {{ font-family: Arial, sans-serif; max-width: 500px; margin: 50px auto; padding: 20px; }}
        .consent-box {{ border: 1px solid #ccc; padding: 20px; border-radius: 5px; }}
        .scopes {{ margin: 20px 0; }}
        .scope-item {{ padding: 5px 0; }}
        input[type=text], input[type=password] {{ width: 100%; padding: 8px; margin: 4px 0; box-sizing: border-box; }}
        .buttons {{ margin-top: 20px; }}
        button {{ padding: 10px 20px; margin-right: 10px; cursor: pointer; }}
        .approve {{ background-color: #4CAF50; color: white; border: none; }}
        .deny {{ background-color: #f44336; color: white; border: none; }}
    </style>
</head>
<body>
    <div class="consent-box">
        <h2>Authorization Request</h2>
        <p><strong>{client_name}</strong> is requesting access to your account.</p>

        <div class="scopes">
            <p><strong>Requested Permissions:</strong></p>
            {scope_list}
        </div>

        <form method="POST" action="/oauth/authorize">
            <input type="hidden" name="client_id" value="{client_id}">
            <input type="hidden" name="redirect_uri" value="{redirect_uri}">
            {state_field}
            {scope_field}
            {challenge_field}
            {method_field}

            <input type="text" name="username" placeholder="Username" required>
            <input type="password" name="password" placeholder="Password" required>

            <div class="buttons">
                <button type="submit" name="approved" value="true" class="approve">Approve</button>
                <button type="submit" name="approved" value="false" class="deny">Deny</button>
            </div>
        </form>
    </div>
</body>
</html>"#,
        client_id = escape_html(&params.client_id),
        redirect_uri = escape_html(&params.redirect_uri),
        state_field = hidden("state", params.state.as_deref()),
        scope_field = hidden("scope", params.scope.as_deref()),
        challenge_field = hidden("code_challenge", params.code_challenge.as_deref()),
        method_field = hidden("code_challenge_method", params.code_challenge_method.as_deref()),
    )
}
