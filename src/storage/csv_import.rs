use crate::error::{config_error, storage_error, PregelError};
use crate::storage::memory::MemoryDocumentStore;
use crate::storage::{FROM_ATTRIBUTE, ID_ATTRIBUTE, KEY_ATTRIBUTE, TO_ATTRIBUTE};
use crate::topology::ShardTopology;
use crate::util::timer::PregelTimer;
use csv::{Reader, StringRecord};
use log::{debug, info, warn};
use pregel_api::Document;
use serde_json::{Map, Number};
use std::fs::File;
use std::io::BufReader;

const DEFAULT_TYPE_STRING: &str = "string";
const DEFAULT_SEPARATOR: u8 = b',';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Int,
    Float,
    Bool,
    String,
}

/// Fills a `MemoryDocumentStore` from CSV files.
///
/// Vertex files start with an `:id` column, edge files with `:start_id` and `:end_id`. Remaining
/// columns are `name[:type]` with type one of `int`, `float`, `bool`, `string`. Vertices are
/// placed by the topology; each edge goes to the edge shard with the same index as the shard of
/// its `_from` vertex, so edge collections end up co-partitioned with the vertex collection.
#[derive(new)]
pub struct CsvImporter<'a> {
    store: &'a MemoryDocumentStore,
    topology: &'a dyn ShardTopology,
    #[new(value = "DEFAULT_SEPARATOR")]
    separator: u8,
}

impl<'a> CsvImporter<'a> {
    pub fn with_separator(mut self, separator: u8) -> Self {
        self.separator = separator;
        self
    }

    pub fn import_vertices(&self, collection: &str, file_path: &str) -> Result<usize, PregelError> {
        let plan_id = self.plan_id(collection)?;
        let mut reader = self.reader(file_path)?;
        let headers = read_headers(&mut reader, file_path)?;
        let columns = parse_schema(headers.iter().skip(1), file_path)?;

        let timer = PregelTimer::now();
        let mut count = 0;
        for (index, line) in reader.records().enumerate() {
            let line = line.map_err(|e| read_error(file_path, e))?;
            let mut parts = line.iter();
            let key = parts.next().filter(|k| !k.is_empty()).ok_or_else(|| {
                config_error(format!("Empty vertex id in line {} of '{}'", index, file_path))
            })?;
            let mut document = parse_properties(parts, &columns, key, file_path)?;
            document.insert(KEY_ATTRIBUTE.to_owned(), Document::from(key));
            document
                .insert(ID_ATTRIBUTE.to_owned(), Document::from(format!("{}/{}", collection, key)));

            let shard = self.topology.resolve_shard(&plan_id, key).ok_or_else(|| {
                storage_error(format!("No shard for vertex '{}/{}'", collection, key))
            })?;
            self.store.insert(&shard, Document::Object(document))?;
            count += 1;
        }
        info!(
            "Imported {} vertices into '{}' in {}",
            count,
            collection,
            timer.elapsed().to_seconds_string()
        );
        Ok(count)
    }

    pub fn import_edges(
        &self,
        edge_collection: &str,
        vertex_collection: &str,
        file_path: &str,
    ) -> Result<usize, PregelError> {
        let vertex_plan_id = self.plan_id(vertex_collection)?;
        let vertex_shards = self.shards(vertex_collection)?;
        let edge_shards = self.shards(edge_collection)?;
        if vertex_shards.len() != edge_shards.len() {
            return Err(PregelError::ShardCountMismatch(
                vertex_collection.to_owned(),
                vertex_shards.len(),
                edge_collection.to_owned(),
                edge_shards.len(),
            ));
        }

        let mut reader = self.reader(file_path)?;
        let headers = read_headers(&mut reader, file_path)?;
        let columns = parse_schema(headers.iter().skip(2), file_path)?;

        let mut count = 0;
        let mut skipped = 0;
        for (index, line) in reader.records().enumerate() {
            let line = line.map_err(|e| read_error(file_path, e))?;
            let mut parts = line.iter();
            let (from, to) = match (parts.next(), parts.next()) {
                (Some(from), Some(to)) if !from.is_empty() && !to.is_empty() => (from, to),
                _ => {
                    debug!("Missing src or dst at line '{}' in file '{}'. Ignoring", index, file_path);
                    skipped += 1;
                    continue;
                }
            };
            let key = count.to_string();
            let mut document = parse_properties(parts, &columns, &key, file_path)?;
            document.insert(KEY_ATTRIBUTE.to_owned(), Document::from(key));
            document.insert(
                FROM_ATTRIBUTE.to_owned(),
                Document::from(format!("{}/{}", vertex_collection, from)),
            );
            document.insert(
                TO_ATTRIBUTE.to_owned(),
                Document::from(format!("{}/{}", vertex_collection, to)),
            );

            let from_shard = self.topology.resolve_shard(&vertex_plan_id, from);
            let shard_index = from_shard
                .and_then(|shard| vertex_shards.iter().position(|s| *s == shard))
                .ok_or_else(|| {
                    storage_error(format!("No shard for vertex '{}/{}'", vertex_collection, from))
                })?;
            self.store.insert(&edge_shards[shard_index], Document::Object(document))?;
            count += 1;
        }
        if skipped > 0 {
            warn!("Skipped {} edges with empty src or dst ids", skipped);
        }
        info!("Imported {} edges into '{}'", count, edge_collection);
        Ok(count)
    }

    fn plan_id(&self, collection: &str) -> Result<String, PregelError> {
        self.topology
            .collection_plan_id(collection)
            .ok_or_else(|| PregelError::UnknownCollection(collection.to_owned()))
    }

    fn shards(&self, collection: &str) -> Result<Vec<String>, PregelError> {
        self.topology
            .global_shards(collection)
            .ok_or_else(|| PregelError::UnknownCollection(collection.to_owned()))
    }

    fn reader(&self, file_path: &str) -> Result<Reader<BufReader<File>>, PregelError> {
        let file = File::open(file_path)
            .map_err(|e| PregelError::ReadFile(file_path.to_owned(), e.to_string()))?;
        Ok(csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.separator)
            .double_quote(false)
            .comment(Some(b'#'))
            .from_reader(BufReader::new(file)))
    }
}

fn read_headers(
    reader: &mut Reader<BufReader<File>>,
    file_path: &str,
) -> Result<StringRecord, PregelError> {
    reader.headers().map(StringRecord::clone).map_err(|e| read_error(file_path, e))
}

fn read_error(file_path: &str, e: csv::Error) -> PregelError {
    PregelError::ReadFile(file_path.to_owned(), e.to_string())
}

fn parse_schema<'a>(
    schema_parts: impl Iterator<Item = &'a str>,
    file_path: &str,
) -> Result<Vec<(String, ColumnType)>, PregelError> {
    let mut columns = Vec::new();
    for schema in schema_parts {
        let mut parts = schema.split(':');
        let column_name = parts.next().unwrap_or("");
        if column_name.is_empty() {
            return Err(config_error(format!("Empty column name found in file '{}'", file_path)));
        }
        let column_type = match parts.next().unwrap_or(DEFAULT_TYPE_STRING).to_lowercase().as_str()
        {
            "int" => ColumnType::Int,
            "float" => ColumnType::Float,
            "bool" => ColumnType::Bool,
            "string" => ColumnType::String,
            other => {
                return Err(config_error(format!(
                    "Unrecognized column type '{}' in file '{}'",
                    other, file_path
                )))
            }
        };
        columns.push((column_name.to_owned(), column_type));
    }
    Ok(columns)
}

fn parse_properties<'a>(
    line_parts: impl Iterator<Item = &'a str>,
    columns: &[(String, ColumnType)],
    id: &str,
    file_path: &str,
) -> Result<Map<String, Document>, PregelError> {
    let mut document = Map::new();
    for (index, value) in line_parts.enumerate() {
        let (name, column_type) = columns.get(index).ok_or_else(|| {
            config_error(format!(
                "No. of columns for id '{}' does not match header in file '{}'",
                id, file_path
            ))
        })?;
        if value.is_empty() {
            continue;
        }
        let parse_error = || {
            config_error(format!(
                "Could not parse '{}' as {:?} for id '{}' in file '{}'",
                value, column_type, id, file_path
            ))
        };
        let parsed = match column_type {
            ColumnType::Int => Document::from(value.parse::<i64>().map_err(|_| parse_error())?),
            ColumnType::Float => value
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Document::Number)
                .ok_or_else(parse_error)?,
            ColumnType::Bool => Document::from(value.parse::<bool>().map_err(|_| parse_error())?),
            ColumnType::String => Document::from(value),
        };
        document.insert(name.clone(), parsed);
    }
    Ok(document)
}

#[cfg(test)]
mod tests {
    use crate::storage::csv_import::{parse_properties, parse_schema, ColumnType};
    use serde_json::json;

    #[test]
    fn schema_and_properties() {
        let columns =
            parse_schema(vec!["weight:float", "name", "age:int"].into_iter(), "test.csv")
                .expect("Valid schema");
        assert_eq!(columns[0], ("weight".to_owned(), ColumnType::Float));
        assert_eq!(columns[1], ("name".to_owned(), ColumnType::String));

        let document =
            parse_properties(vec!["1.5", "ada", ""].into_iter(), &columns, "a", "test.csv")
                .expect("Valid line");
        assert_eq!(serde_json::Value::Object(document), json!({"weight": 1.5, "name": "ada"}));

        assert!(parse_properties(vec!["x"].into_iter(), &columns, "a", "test.csv").is_err());
        assert!(parse_schema(vec!["w:decimal"].into_iter(), "test.csv").is_err());
    }
}
