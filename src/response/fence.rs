//! Markdown code fence scanning shared by the cleaner and the segment parser.

/// A line that opens or closes a triple-backtick fence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenceLine {
    pub index: usize,
    pub info: String,
}

/// Returns the fence info string when `line` is a fence line.
pub fn fence_info(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if line.len() - trimmed.len() > 3 || !trimmed.starts_with("```") {
        return None;
    }
    Some(trimmed.trim_start_matches('`').trim())
}

pub fn is_fence(line: &str) -> bool {
    fence_info(line).is_some()
}

/// Collects every fence line in order.
pub fn fence_lines(lines: &[&str]) -> Vec<FenceLine> {
    lines
        .iter()
        .enumerate()
        .filter_map(|(index, line)| {
            fence_info(line).map(|info| FenceLine {
                index,
                info: info.to_string(),
            })
        })
        .collect()
}

/// Finds the fence closing the one opened at `open`.
///
/// A fence with an info string always opens a nested block; a bare fence
/// closes the innermost open block. Returns `None` for unterminated fences.
pub fn closing_fence(lines: &[&str], open: usize) -> Option<usize> {
    if !lines.get(open).is_some_and(|line| is_fence(line)) {
        return None;
    }
    let mut depth = 0usize;
    for (index, line) in lines.iter().enumerate().skip(open) {
        let Some(info) = fence_info(line) else {
            continue;
        };
        if depth == 0 || !info.is_empty() {
            depth += 1;
        } else {
            depth -= 1;
            if depth == 0 {
                return Some(index);
            }
        }
    }
    None
}

/// True when the last fence in `lines` would open a block with nothing after it.
pub fn has_dangling_trailing_fence(lines: &[&str]) -> bool {
    let Some(last) = lines.iter().rposition(|line| !line.trim().is_empty()) else {
        return false;
    };
    match fence_info(lines[last]) {
        Some(info) if info.is_empty() => {}
        _ => return false,
    }
    let mut depth = 0usize;
    for line in &lines[..last] {
        if let Some(info) = fence_info(line) {
            if depth == 0 || !info.is_empty() {
                depth += 1;
            } else {
                depth -= 1;
            }
        }
    }
    depth == 0
}
