pub fn render_schema() -> String {
	expand_includes(include_str!("../../../sql/init.sql"))
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"tables/001_logical_contacts.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_logical_contacts.sql")),
				"tables/002_raw_records.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_raw_records.sql")),
				"tables/003_field_rows.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_field_rows.sql")),
				"tables/004_aggregation_links.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_aggregation_links.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}
