use crate::document::Document;
use crate::BuildError;
use std::collections::BTreeSet;
use strata_schema::Selector;

/// Ordered collection of documents. Order is the load order until emission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceSet {
    docs: Vec<Document>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn push(&mut self, doc: Document) {
        self.docs.push(doc);
    }

    pub fn append(&mut self, other: ResourceSet) {
        self.docs.extend(other.docs);
    }

    pub fn documents(&self) -> &[Document] {
        &self.docs
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Document> {
        self.docs.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Document> {
        self.docs.iter_mut()
    }

    pub fn get(&self, index: usize) -> Option<&Document> {
        self.docs.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Document> {
        self.docs.get_mut(index)
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.docs
    }

    /// Indices of documents matching `selector`, in set order.
    pub fn select(&self, selector: &Selector) -> Vec<usize> {
        self.docs
            .iter()
            .enumerate()
            .filter(|(_, d)| d.matches(selector))
            .map(|(i, _)| i)
            .collect()
    }

    /// Fail on the first identity produced twice.
    pub fn ensure_unique(&self) -> Result<(), BuildError> {
        let mut seen = BTreeSet::new();
        for doc in &self.docs {
            let id = doc.id();
            if !seen.insert(id.clone()) {
                return Err(BuildError::IdentityCollision { id: id.to_string() });
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ResourceSet {
    type Item = &'a Document;
    type IntoIter = std::slice::Iter<'a, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.docs.iter()
    }
}

impl FromIterator<Document> for ResourceSet {
    fn from_iter<I: IntoIterator<Item = Document>>(iter: I) -> Self {
        Self {
            docs: iter.into_iter().collect(),
        }
    }
}
