//! Dashboard page rendering.

use crate::tracking::TrackingEvent;
use crate::util::escape_html;

pub const HOME_HTML: &str = "<h2>Welcome to the Email Tracking Server</h2>\
<p>Visit <a href='/dashboard'>/dashboard</a> to see tracking logs.</p>";

/// Render the event log as a single HTML page, rows in store order.
pub fn render_dashboard(events: &[TrackingEvent]) -> String {
    let mut rows = String::new();
    for event in events {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td class=\"{}\">{}</td><td>{}</td></tr>\n",
            escape_html(&event.email),
            escape_html(&event.tracking_id),
            event.kind.as_str().to_lowercase(),
            event.kind,
            escape_html(&event.time),
        ));
    }

    if events.is_empty() {
        rows.push_str("<tr><td colspan=\"4\">No tracking events recorded yet.</td></tr>\n");
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Email Tracking Dashboard</title>
<style>
body {{ font-family: sans-serif; margin: 2em; }}
table {{ border-collapse: collapse; width: 100%; }}
th, td {{ border: 1px solid #ccc; padding: 6px 10px; text-align: left; }}
th {{ background: #f4f4f4; }}
td.open {{ color: #2a7a2a; }}
td.click {{ color: #1f4fa8; }}
</style>
</head>
<body>
<h2>Email Tracking Dashboard</h2>
<p>{count} events</p>
<table>
<tr><th>Email</th><th>Tracking ID</th><th>Event</th><th>Time</th></tr>
{rows}</table>
</body>
</html>
"#,
        count = events.len(),
        rows = rows,
    )
}
