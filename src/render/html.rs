//! Server-side rendering of the dashboard page.
//!
//! The static parts are kept as `&'static str` and bundled into the binary;
//! only the panel contents are interpolated.

use crate::{
    panels::{MapView, TableView, UploadView},
    shell::DashboardView,
};

/// Route the page polls for fresh markers.
pub const MARKERS_ROUTE: &str = "/map/markers";
/// Route the upload form posts to.
pub const UPLOAD_ROUTE: &str = "/upload";

const PAGE_HEAD: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <link rel="stylesheet" href="https://unpkg.com/leaflet@1.7.1/dist/leaflet.css" />
  <script src="https://unpkg.com/leaflet@1.7.1/dist/leaflet.js"></script>
  <script src="https://cdn.tailwindcss.com"></script>
"#;

const MAP_SCRIPT: &str = r#"
<script>
  (function () {
    const cfg = JSON.parse(document.getElementById('map-data').textContent);
    const map = L.map('map').setView([cfg.settings.center_lat, cfg.settings.center_lon], cfg.settings.zoom);
    L.tileLayer(cfg.settings.tile_url, { attribution: cfg.settings.attribution }).addTo(map);
    const icon = new L.Icon({
      iconUrl: 'https://unpkg.com/leaflet@1.7.1/dist/images/marker-icon.png',
      iconSize: [25, 41],
      iconAnchor: [12, 41],
    });
    const layer = L.layerGroup().addTo(map);
    const esc = (s) => String(s).replace(/[&<>"']/g, (c) => ({'&':'&amp;','<':'&lt;','>':'&gt;','"':'&quot;',"'":'&#39;'}[c]));
    function draw(markers) {
      layer.clearLayers();
      for (const m of markers) {
        const p = m.popup;
        let html = '<strong>' + esc(p.title) + '</strong> <br />Severity: ' + esc(p.severity) + ' <br />Priority: ' + esc(p.priority);
        if (p.traffic_density) html += ' <br />Traffic: ' + esc(p.traffic_density);
        L.marker([m.latitude, m.longitude], { icon }).bindPopup(html).addTo(layer);
      }
    }
    draw(cfg.markers);
    setInterval(function () {
      fetch(cfg.markers_route)
        .then((res) => (res.ok ? res.json() : Promise.reject(res.status)))
        .then(draw)
        .catch((err) => console.error(err));
    }, cfg.refresh_interval_ms);
  })();
</script>
"#;

pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// JSON that is safe to place inside a `<script>` element.
fn script_json(value: &serde_json::Value) -> String {
    value.to_string().replace("</", "<\\/")
}

pub fn render_dashboard(view: &DashboardView) -> String {
    let mut page = String::with_capacity(8 * 1024);
    page.push_str(PAGE_HEAD);
    page.push_str(&format!("  <title>{}</title>\n</head>\n", escape(view.title)));
    page.push_str("<body>\n<div class=\"p-6\">\n");
    page.push_str(&format!(
        "  <h1 class=\"text-3xl font-bold text-center mb-6 text-blue-700\">{}</h1>\n",
        escape(view.title)
    ));
    page.push_str("  <div class=\"grid md:grid-cols-2 gap-6\">\n");
    page.push_str(&render_map(&view.map));
    page.push_str(&render_upload(&view.upload));
    page.push_str("  </div>\n  <div class=\"mt-8\">\n");
    page.push_str(&render_table(&view.table));
    page.push_str("  </div>\n</div>\n");
    page.push_str(MAP_SCRIPT);
    page.push_str("</body>\n</html>\n");
    page
}

pub fn render_map(map: &MapView) -> String {
    let data = serde_json::json!({
        "settings": map.settings,
        "markers": map.markers,
        "refresh_interval_ms": map.refresh_interval_ms,
        "markers_route": MARKERS_ROUTE,
    });
    format!(
        "    <div id=\"map\" class=\"h-96 w-full rounded-lg shadow-md\" data-markers=\"{}\"></div>\n    <script id=\"map-data\" type=\"application/json\">{}</script>\n",
        map.markers.len(),
        script_json(&data)
    )
}

pub fn render_upload(upload: &UploadView) -> String {
    let mut html = String::new();
    html.push_str("    <div class=\"bg-white p-6 rounded-lg shadow-md\">\n");
    html.push_str(&format!(
        "      <h2 class=\"text-xl font-semibold mb-4\">{}</h2>\n",
        escape(upload.heading)
    ));
    html.push_str(&format!(
        "      <form method=\"post\" action=\"{}\" enctype=\"multipart/form-data\" class=\"flex flex-col gap-4\">\n",
        UPLOAD_ROUTE
    ));
    html.push_str(&format!(
        "        <input type=\"file\" name=\"{}\" accept=\"{}\" class=\"p-2 border rounded\" required />\n",
        crate::client::UPLOAD_FIELD,
        escape(upload.accept)
    ));
    html.push_str(&format!(
        "        <select name=\"{}\" class=\"p-2 border rounded\">\n",
        crate::client::TRAFFIC_DENSITY_FIELD
    ));
    let current = upload.traffic_density.as_deref().unwrap_or("");
    for (value, label) in [("", "Traffic: estimate"), ("low", "Low"), ("medium", "Medium"), ("high", "High")] {
        let selected = if value == current { " selected" } else { "" };
        html.push_str(&format!(
            "          <option value=\"{}\"{}>{}</option>\n",
            value, selected, label
        ));
    }
    html.push_str("        </select>\n");
    if let Some(name) = &upload.selected_file {
        html.push_str(&format!(
            "        <p class=\"text-sm text-gray-600\">Pending: {}</p>\n",
            escape(name)
        ));
    }
    html.push_str("        <button type=\"submit\" class=\"bg-blue-500 hover:bg-blue-600 text-white py-2 px-4 rounded\">\n          Upload\n        </button>\n");
    html.push_str("      </form>\n    </div>\n");
    html
}

pub fn render_table(table: &TableView) -> String {
    let mut html = String::new();
    html.push_str("    <div class=\"bg-white p-6 rounded-lg shadow-md\">\n");
    html.push_str(&format!(
        "      <h2 class=\"text-xl font-semibold mb-4\">{}</h2>\n",
        escape(table.heading)
    ));
    html.push_str("      <table class=\"w-full table-auto\">\n        <thead>\n          <tr class=\"bg-gray-200\">\n");
    for column in table.columns {
        html.push_str(&format!("            <th class=\"p-2\">{}</th>\n", escape(column)));
    }
    html.push_str("          </tr>\n        </thead>\n        <tbody>\n");
    for row in &table.rows {
        html.push_str(&format!(
            "          <tr class=\"text-center\" data-id=\"{}\">\n",
            escape(&row.id.to_string())
        ));
        html.push_str(&format!("            <td class=\"p-2\">{}</td>\n", escape(&row.kind)));
        html.push_str(&format!("            <td class=\"p-2\">{}</td>\n", escape(&row.severity)));
        html.push_str(&format!(
            "            <td class=\"p-2 font-bold text-red-500\">{}</td>\n",
            escape(&row.priority)
        ));
        html.push_str(&format!("            <td class=\"p-2\">{}</td>\n", escape(&row.location)));
        html.push_str(&format!("            <td class=\"p-2\">{}</td>\n", escape(&row.timestamp)));
        html.push_str("          </tr>\n");
    }
    html.push_str("        </tbody>\n      </table>\n    </div>\n");
    html
}

/// Page returned after a form post: shows each alert, then either reloads
/// the dashboard or goes back to the form with the file still picked.
pub fn render_notice(alerts: &[String], reload: bool) -> String {
    let messages: Vec<serde_json::Value> = alerts
        .iter()
        .map(|a| serde_json::Value::String(a.clone()))
        .collect();
    let next = if reload {
        "window.location.replace('/');"
    } else {
        "window.history.back();"
    };
    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head><meta charset=\"UTF-8\" /><title>Upload</title></head>\n<body>\n<script>\n  for (const m of {}) {{ alert(m); }}\n  {}\n</script>\n<noscript>{}</noscript>\n</body>\n</html>\n",
        script_json(&serde_json::Value::Array(messages)),
        next,
        alerts.iter().map(|a| escape(a)).collect::<Vec<_>>().join("<br />")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::MapSettings,
        model::ReportId,
        panels::{
            table::{TABLE_COLUMNS, TABLE_HEADING},
            upload::{ACCEPTED_MEDIA, UPLOAD_HEADING},
            Marker, Popup, TableRow,
        },
        shell::DASHBOARD_TITLE,
    };

    fn view() -> DashboardView {
        DashboardView {
            title: DASHBOARD_TITLE,
            map: MapView {
                settings: MapSettings::default(),
                refresh_interval_ms: 30_000,
                markers: vec![Marker {
                    id: ReportId::Int(1),
                    latitude: 12.9721,
                    longitude: 77.5933,
                    popup: Popup {
                        title: "pothole</script>".to_string(),
                        severity: "high".to_string(),
                        priority: "P1".to_string(),
                        traffic_density: None,
                    },
                }],
            },
            upload: UploadView {
                heading: UPLOAD_HEADING,
                accept: ACCEPTED_MEDIA,
                selected_file: None,
                traffic_density: None,
            },
            table: TableView {
                heading: TABLE_HEADING,
                columns: TABLE_COLUMNS,
                rows: vec![TableRow {
                    id: ReportId::Int(1),
                    kind: "<b>pothole</b>".to_string(),
                    severity: "high".to_string(),
                    priority: "P1".to_string(),
                    location: "12.9721, 77.5933".to_string(),
                    timestamp: "1/1/2024, 12:00:00 AM".to_string(),
                }],
            },
        }
    }

    #[test]
    fn test_dashboard_page_has_all_panels() {
        let page = render_dashboard(&view());
        assert!(page.contains("<h1 class=\"text-3xl font-bold text-center mb-6 text-blue-700\">Smart Pavers Dashboard</h1>"));
        assert!(page.contains("Upload Defect Image"));
        assert!(page.contains("Defect Reports"));
        assert!(page.contains("<td class=\"p-2\">12.9721, 77.5933</td>"));
        assert!(page.contains("<td class=\"p-2 font-bold text-red-500\">P1</td>"));
        assert!(page.contains("data-markers=\"1\""));
        assert!(page.contains("accept=\"image/*,video/*\""));
        assert_eq!(page.matches("<tr class=\"text-center\"").count(), 1);
    }

    #[test]
    fn test_untrusted_text_is_escaped() {
        let page = render_dashboard(&view());
        assert!(page.contains("&lt;b&gt;pothole&lt;/b&gt;"));
        assert!(!page.contains("pothole</script>"));
        assert!(page.contains("pothole<\\/script>"));
    }

    #[test]
    fn test_notice_reloads_only_on_success() {
        let ok = render_notice(&["done".to_string()], true);
        assert!(ok.contains("window.location.replace('/')"));
        assert!(ok.contains("[\"done\"]"));

        let failed = render_notice(&["failed".to_string()], false);
        assert!(failed.contains("window.history.back()"));
        assert!(!failed.contains("location.replace"));
    }
}
