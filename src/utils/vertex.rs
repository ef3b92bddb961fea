//! Vertex AI endpoint helpers.

/// Build a Vertex AI base URL given project, location and publisher.
///
/// Regional locations use `https://{location}-aiplatform.googleapis.com`; `global`
/// uses the global host.
pub fn vertex_base_url(project: &str, location: &str, publisher: &str) -> String {
    let host = if location == "global" {
        "aiplatform.googleapis.com".to_string()
    } else {
        format!("{location}-aiplatform.googleapis.com")
    };
    format!(
        "https://{}/v1/projects/{}/locations/{}/publishers/{}",
        host, project, location, publisher
    )
}

/// Strip resource prefixes (`models/`, `publishers/google/models/`) from a model id.
pub fn normalize_model_id(model: &str) -> String {
    let trimmed = model.trim().trim_matches('/');
    if let Some(pos) = trimmed.rfind("/models/") {
        return trimmed[(pos + "/models/".len())..].to_string();
    }
    if let Some(rest) = trimmed.strip_prefix("models/") {
        return rest.to_string();
    }
    trimmed.to_string()
}

/// `{base}/models/{model}:{method}`
pub fn model_method_url(base_url: &str, model: &str, method: &str) -> String {
    format!(
        "{}/models/{}:{}",
        base_url.trim_end_matches('/'),
        normalize_model_id(model),
        method
    )
}
