//! 状态表的磁盘层
//!
//! 一张 redb 表 `name -> JSON记录`，数据库文件放在临时目录里，随 [`SpillStore`] 一起删除。

use redb::{Database, Durability, ReadableTable, TableDefinition};
use std::path::Path;
use tempfile::TempDir;

use crate::error::LedgerError;
use crate::model::QueryRecord;

const SPILL_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("pending");

pub struct SpillStore {
    db: Database,
    // 必须在 db 之后析构
    _dir: TempDir,
    len: usize,
}

impl SpillStore {
    /// 在指定目录（默认系统临时目录）下创建临时数据库
    pub fn new(dir: Option<&Path>) -> Result<Self, LedgerError> {
        let dir = match dir {
            Some(dir) => tempfile::Builder::new().prefix("rsubscan-").tempdir_in(dir)?,
            None => tempfile::Builder::new().prefix("rsubscan-").tempdir()?,
        };
        let db = Database::create(dir.path().join("spill.redb"))?;

        let write_txn = db.begin_write()?;
        {
            write_txn.open_table(SPILL_TABLE)?;
        }
        write_txn.commit()?;

        Ok(SpillStore { db, _dir: dir, len: 0 })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, key: &str) -> Result<bool, LedgerError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SPILL_TABLE)?;
        Ok(table.get(key)?.is_some())
    }

    pub fn keys(&self) -> Result<Vec<String>, LedgerError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SPILL_TABLE)?;
        let mut keys = Vec::with_capacity(self.len);
        for entry in table.iter()? {
            let (key, _) = entry?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }

    /// 写入或覆盖一条记录
    pub fn put(&mut self, record: &QueryRecord) -> Result<(), LedgerError> {
        let value = serde_json::to_vec(record)?;
        let mut write_txn = self.db.begin_write()?;
        // 临时数据，不需要每次提交都落盘
        write_txn.set_durability(Durability::Eventual);
        let inserted = {
            let mut table = write_txn.open_table(SPILL_TABLE)?;
            let old = table.insert(record.domain.as_str(), value.as_slice())?;
            old.is_none()
        };
        write_txn.commit()?;
        if inserted {
            self.len += 1;
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<QueryRecord>, LedgerError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SPILL_TABLE)?;
        match table.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn delete(&mut self, key: &str) -> Result<Option<QueryRecord>, LedgerError> {
        let mut write_txn = self.db.begin_write()?;
        write_txn.set_durability(Durability::Eventual);
        let removed = {
            let mut table = write_txn.open_table(SPILL_TABLE)?;
            let old = table.remove(key)?;
            match old {
                Some(value) => Some(serde_json::from_slice::<QueryRecord>(value.value())?),
                None => None,
            }
        };
        write_txn.commit()?;
        if removed.is_some() {
            self.len -= 1;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn record(name: &str, retry: u32) -> QueryRecord {
        let mut r = QueryRecord::new(name, Ipv4Addr::new(1, 1, 1, 1));
        r.retry = retry;
        r
    }

    #[test]
    fn put_get_overwrite_delete() {
        let mut store = SpillStore::new(None).unwrap();
        store.put(&record("a.example.com", 1)).unwrap();
        store.put(&record("b.example.com", 1)).unwrap();
        store.put(&record("a.example.com", 2)).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("a.example.com").unwrap().unwrap().retry, 2);
        assert_eq!(store.delete("b.example.com").unwrap().unwrap().retry, 1);
        assert!(store.delete("b.example.com").unwrap().is_none());
        assert!(!store.contains("b.example.com").unwrap());
        assert!(store.contains("a.example.com").unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn keys_follow_overwrites_and_deletes() {
        let mut store = SpillStore::new(None).unwrap();
        for round in 0..5 {
            for i in 0..10 {
                store.put(&record(&format!("host{}.example.com", i), round)).unwrap();
            }
        }
        store.delete("host3.example.com").unwrap();

        let mut keys = store.keys().unwrap();
        keys.sort();
        assert_eq!(keys.len(), 9);
        assert_eq!(store.len(), 9);
        assert!(!keys.contains(&"host3.example.com".to_string()));
        assert_eq!(store.get("host7.example.com").unwrap().unwrap().retry, 4);
    }

    #[test]
    fn database_lives_in_given_dir_and_is_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let mut store = SpillStore::new(Some(parent.path())).unwrap();
        store.put(&record("a.example.com", 1)).unwrap();
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 1);

        drop(store);
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
    }
}
