//! Files found on the network, merged from LS_LIST responses.

/// A file and the origins known to hold it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub name: String,
    pub size: u64,
    pub origins: Vec<String>,
}

/// Search results in discovery order. Entries are keyed by (name, size): the same
/// name with a different size is a different file.
#[derive(Debug, Clone, Default)]
pub struct FileCatalog {
    files: Vec<FileDescriptor>,
}

impl FileCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `origin` holds (`name`, `size`). A repeated origin is not added twice.
    pub fn merge(&mut self, name: &str, size: u64, origin: &str) {
        if let Some(file) = self
            .files
            .iter_mut()
            .find(|f| f.name == name && f.size == size)
        {
            if !file.origins.iter().any(|o| o == origin) {
                file.origins.push(origin.to_string());
            }
            return;
        }
        self.files.push(FileDescriptor {
            name: name.to_string(),
            size,
            origins: vec![origin.to_string()],
        });
    }

    pub fn files(&self) -> &[FileDescriptor] {
        &self.files
    }

    pub fn get(&self, i: usize) -> Option<&FileDescriptor> {
        self.files.get(i)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_and_size_gains_origin() {
        let mut c = FileCatalog::new();
        c.merge("a.txt", 10, "p:1");
        c.merge("a.txt", 10, "p:2");
        assert_eq!(c.len(), 1);
        assert_eq!(c.files()[0].origins, vec!["p:1", "p:2"]);
    }

    #[test]
    fn different_size_is_new_entry() {
        let mut c = FileCatalog::new();
        c.merge("a.txt", 10, "p:1");
        c.merge("a.txt", 11, "p:2");
        c.merge("b.txt", 10, "p:1");
        assert_eq!(c.len(), 3);
        assert_eq!(c.get(1).unwrap().size, 11);
    }

    #[test]
    fn duplicate_origin_ignored() {
        let mut c = FileCatalog::new();
        c.merge("a.txt", 10, "p:1");
        c.merge("a.txt", 10, "p:1");
        assert_eq!(c.files()[0].origins.len(), 1);
    }
}
