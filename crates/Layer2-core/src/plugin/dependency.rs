//! Plugin dependency ordering
//!
//! 의존성이 먼저 시작되도록 정렬합니다. 서로 독립적인 플러그인은 설정 순서를 유지합니다.

use plughost_foundation::{Error, Result};
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

/// 정렬 결과
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartPlan {
    /// 시작 순서 (의존성 먼저)
    pub order: Vec<String>,

    /// 그래프에 없는 의존성 `(plugin, dependency)`
    pub external: Vec<(String, String)>,
}

/// 의존성 그래프 (edge: dependency → dependent)
#[derive(Debug)]
struct DependencyGraph {
    size: usize,
    edges: Vec<Vec<usize>>,
    /// 역방향 edge (dependent → dependency), 순환 경로 추적용
    requires: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
}

impl DependencyGraph {
    fn new(size: usize) -> Self {
        Self {
            size,
            edges: vec![Vec::new(); size],
            requires: vec![Vec::new(); size],
            in_degree: vec![0; size],
        }
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        if from < self.size && to < self.size && !self.edges[from].contains(&to) {
            self.edges[from].push(to);
            self.requires[to].push(from);
            self.in_degree[to] += 1;
        }
    }

    /// Kahn 정렬, 준비된 노드 중 인덱스가 가장 작은 것부터
    ///
    /// 남은 노드가 있으면 `Err(remaining)`
    fn topological_order(&self) -> std::result::Result<Vec<usize>, Vec<usize>> {
        let mut in_degree = self.in_degree.clone();
        let mut ready: BTreeSet<usize> = (0..self.size).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(self.size);

        while let Some(node) = ready.pop_first() {
            order.push(node);
            for &neighbor in &self.edges[node] {
                in_degree[neighbor] -= 1;
                if in_degree[neighbor] == 0 {
                    ready.insert(neighbor);
                }
            }
        }

        if order.len() == self.size {
            Ok(order)
        } else {
            Err((0..self.size).filter(|&i| in_degree[i] > 0).collect())
        }
    }

    /// 남은 노드에서 의존성을 따라가며 순환 경로 추출
    ///
    /// 남은 노드는 모두 남은 의존성을 하나 이상 가지므로 반드시 순환에 도달합니다.
    fn find_cycle(&self, remaining: &[usize]) -> Vec<usize> {
        let Some(&start) = remaining.first() else {
            return Vec::new();
        };

        let mut path: Vec<usize> = Vec::new();
        let mut position: HashMap<usize, usize> = HashMap::new();
        let mut node = start;

        loop {
            if let Some(&at) = position.get(&node) {
                let mut cycle = path[at..].to_vec();
                cycle.push(node);
                return cycle;
            }
            position.insert(node, path.len());
            path.push(node);

            match self.requires[node].iter().find(|dep| remaining.contains(dep)) {
                Some(&next) => node = next,
                None => return path,
            }
        }
    }
}

/// 시작 순서 계산
///
/// `nodes`는 설정 순서의 `(name, depends_on)` 목록입니다.
/// 목록에 없는 의존성은 `external`로 보고되며, 확인은 호출자가 합니다.
pub fn resolve_start_order(nodes: &[(String, Vec<String>)]) -> Result<StartPlan> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, (name, _))| (name.as_str(), i))
        .collect();

    let mut graph = DependencyGraph::new(nodes.len());
    let mut external = Vec::new();

    for (i, (name, deps)) in nodes.iter().enumerate() {
        for dep in deps {
            match index.get(dep.as_str()) {
                Some(&from) => graph.add_edge(from, i),
                None => external.push((name.clone(), dep.clone())),
            }
        }
    }

    match graph.topological_order() {
        Ok(order) => Ok(StartPlan {
            order: order.into_iter().map(|i| nodes[i].0.clone()).collect(),
            external,
        }),
        Err(remaining) => {
            let cycle: Vec<String> = graph
                .find_cycle(&remaining)
                .into_iter()
                .map(|i| nodes[i].0.clone())
                .collect();
            warn!("Plugin dependency cycle detected: {}", cycle.join(" -> "));
            Err(Error::DependencyCycle(cycle))
        }
    }
}
