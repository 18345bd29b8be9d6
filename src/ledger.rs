//! 待响应查询状态表
//!
//! 内存层是 `DashMap`，条目数超过上限后新记录写入磁盘层 [`SpillStore`]。
//! 同一个key只会存在于其中一层。发送、重试扫描、接收三个循环可以直接并发使用。

use dashmap::DashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::LedgerError;
use crate::model::QueryRecord;
use crate::spill::SpillStore;

pub const DEFAULT_MEMORY_LIMIT: usize = 100_000;

pub struct Ledger {
    memory: DashMap<String, QueryRecord>,
    disk: Mutex<SpillStore>,
    memory_limit: usize,
}

impl Ledger {
    pub fn new(memory_limit: usize, spill_dir: Option<&Path>) -> Result<Self, LedgerError> {
        Ok(Ledger {
            memory: DashMap::new(),
            disk: Mutex::new(SpillStore::new(spill_dir)?),
            memory_limit,
        })
    }

    fn disk(&self) -> MutexGuard<'_, SpillStore> {
        match self.disk.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 写入或覆盖
    pub fn put(&self, record: QueryRecord) -> Result<(), LedgerError> {
        if let Some(mut slot) = self.memory.get_mut(&record.domain) {
            *slot = record;
            return Ok(());
        }

        // 持有磁盘锁期间决定新key落在哪一层
        let mut disk = self.disk();
        if self.memory.len() >= self.memory_limit || disk.contains(&record.domain)? {
            return disk.put(&record);
        }
        self.memory.insert(record.domain.clone(), record);
        Ok(())
    }

    /// 只在key仍然存在且重试次数仍为 `expected_retry` 时覆盖，返回是否写入
    ///
    /// 重发走这条路径：已被接收端删除的key不会被重新插入，
    /// 同一条超时记录被重复投递时也只有第一次生效。
    pub fn update_if_current(&self, record: QueryRecord, expected_retry: u32) -> Result<bool, LedgerError> {
        if let Some(mut slot) = self.memory.get_mut(&record.domain) {
            if slot.retry != expected_retry {
                return Ok(false);
            }
            *slot = record;
            return Ok(true);
        }
        let mut disk = self.disk();
        match disk.get(&record.domain)? {
            Some(current) if current.retry == expected_retry => {
                disk.put(&record)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn get(&self, key: &str) -> Result<Option<QueryRecord>, LedgerError> {
        if let Some(record) = self.memory.get(key) {
            return Ok(Some(record.value().clone()));
        }
        self.disk().get(key)
    }

    pub fn contains(&self, key: &str) -> Result<bool, LedgerError> {
        if self.memory.contains_key(key) {
            return Ok(true);
        }
        self.disk().contains(key)
    }

    pub fn delete(&self, key: &str) -> Result<Option<QueryRecord>, LedgerError> {
        if let Some((_, record)) = self.memory.remove(key) {
            return Ok(Some(record));
        }
        self.disk().delete(key)
    }

    pub fn len(&self) -> usize {
        self.memory.len() + self.disk().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 磁盘层中的条目数
    pub fn spilled(&self) -> usize {
        self.disk().len()
    }

    /// 遍历开始时的快照，回调中可以删除条目
    ///
    /// 内存层整体复制（受上限约束），磁盘层先取key列表再逐条读取，已被删除的key跳过。
    pub fn for_each<F>(&self, mut f: F) -> Result<(), LedgerError>
    where
        F: FnMut(QueryRecord),
    {
        let snapshot: Vec<QueryRecord> = self.memory.iter().map(|e| e.value().clone()).collect();
        for record in snapshot {
            f(record);
        }

        let keys = self.disk().keys()?;
        for key in keys {
            let record = self.disk().get(&key)?;
            if let Some(record) = record {
                f(record);
            }
        }
        Ok(())
    }

    /// 清空两层存储
    pub fn close(&self) {
        self.memory.clear();
        let mut disk = self.disk();
        let keys = match disk.keys() {
            Ok(keys) => keys,
            Err(e) => {
                log::warn!("清理状态表失败: {}", e);
                return;
            }
        };
        for key in keys {
            if let Err(e) = disk.delete(&key) {
                log::warn!("清理状态表失败: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::Arc;
    use std::thread;

    fn record(name: &str) -> QueryRecord {
        QueryRecord::new(name, Ipv4Addr::new(8, 8, 8, 8))
    }

    #[test]
    fn spills_beyond_memory_limit() {
        let ledger = Ledger::new(2, None).unwrap();
        for i in 0..5 {
            ledger.put(record(&format!("h{}.example.com", i))).unwrap();
        }
        assert_eq!(ledger.len(), 5);
        assert_eq!(ledger.spilled(), 3);

        let mut seen = Vec::new();
        ledger.for_each(|r| seen.push(r.domain)).unwrap();
        seen.sort();
        assert_eq!(seen.len(), 5);
        assert_eq!(seen[0], "h0.example.com");

        // 已在磁盘层的key覆盖后仍在磁盘层
        let mut updated = record("h4.example.com");
        updated.retry = 3;
        assert!(!ledger.update_if_current(updated.clone(), 2).unwrap());
        assert!(ledger.update_if_current(updated, 0).unwrap());
        assert_eq!(ledger.spilled(), 3);
        assert_eq!(ledger.get("h4.example.com").unwrap().unwrap().retry, 3);
    }

    #[test]
    fn delete_is_dominant_for_retries() {
        let ledger = Ledger::new(10, None).unwrap();
        ledger.put(record("a.example.com")).unwrap();
        assert!(ledger.delete("a.example.com").unwrap().is_some());
        assert!(ledger.delete("a.example.com").unwrap().is_none());

        let mut late = record("a.example.com");
        late.retry = 2;
        assert!(!ledger.update_if_current(late, 1).unwrap());
        assert!(!ledger.contains("a.example.com").unwrap());
        assert!(ledger.is_empty());
    }

    #[test]
    fn duplicate_retry_applies_once() {
        let ledger = Ledger::new(10, None).unwrap();
        let mut first = record("a.example.com");
        first.retry = 1;
        ledger.put(first.clone()).unwrap();

        let mut next = first.clone();
        next.retry = 2;
        assert!(ledger.update_if_current(next.clone(), 1).unwrap());
        // 同一个超时快照被投递第二次
        assert!(!ledger.update_if_current(next, 1).unwrap());
        assert_eq!(ledger.get("a.example.com").unwrap().unwrap().retry, 2);
    }

    #[test]
    fn delete_during_scan() {
        let ledger = Ledger::new(3, None).unwrap();
        for i in 0..6 {
            ledger.put(record(&format!("h{}.example.com", i))).unwrap();
        }
        let mut visited = 0;
        ledger
            .for_each(|r| {
                visited += 1;
                ledger.delete(&r.domain).unwrap();
            })
            .unwrap();
        assert_eq!(visited, 6);
        assert!(ledger.is_empty());
    }

    #[test]
    fn concurrent_put_and_delete() {
        let ledger = Arc::new(Ledger::new(64, None).unwrap());
        let writers: Vec<_> = (0..4)
            .map(|t| {
                let ledger = ledger.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        ledger.put(record(&format!("t{}-{}.example.com", t, i))).unwrap();
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }
        assert_eq!(ledger.len(), 400);

        let deleters: Vec<_> = (0..4)
            .map(|t| {
                let ledger = ledger.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        assert!(ledger.delete(&format!("t{}-{}.example.com", t, i)).unwrap().is_some());
                    }
                })
            })
            .collect();
        for d in deleters {
            d.join().unwrap();
        }
        assert!(ledger.is_empty());
    }
}
