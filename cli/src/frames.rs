use anyhow::{Context, Result, bail};
use faultline_localizer::{LocalizeRequest, StackFrame};
use serde::Deserialize;

/// Parse a `--frame` flag of the form `FILE:LINE:METHOD`.
///
/// The method may be qualified with its class (`Validator.validate`); the
/// last dot splits class from method. Paths may contain colons, so the line
/// and method are taken from the right.
pub fn parse_frame_flag(raw: &str) -> Result<StackFrame> {
    let mut parts = raw.rsplitn(3, ':');
    let (Some(method), Some(line), Some(file)) = (parts.next(), parts.next(), parts.next()) else {
        bail!("Frame must look like FILE:LINE:METHOD, got '{raw}'");
    };

    if file.is_empty() || method.is_empty() {
        bail!("Frame must look like FILE:LINE:METHOD, got '{raw}'");
    }
    let line_number: usize = line
        .parse()
        .with_context(|| format!("Invalid line number '{line}' in frame '{raw}'"))?;

    let frame = match method.rsplit_once('.') {
        Some((class, name)) if !class.is_empty() && !name.is_empty() => {
            StackFrame::new(file, line_number, name).with_class(class)
        }
        _ => StackFrame::new(file, line_number, method),
    };
    Ok(frame)
}

/// Shape accepted by `--input`: either a bare list of frames or a full request
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RequestDocument {
    Frames(Vec<StackFrame>),
    Request(LocalizeRequest),
}

/// Parse a JSON request document read from a file or stdin
pub fn parse_request_document(content: &str) -> Result<LocalizeRequest> {
    let document: RequestDocument =
        serde_json::from_str(content).context("Input is neither a frame list nor a request")?;
    Ok(match document {
        RequestDocument::Frames(frames) => LocalizeRequest::default().with_frames(frames),
        RequestDocument::Request(request) => request,
    })
}
