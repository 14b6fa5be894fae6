//! 自适应积分. 一维用梯形, 二维把矩形分成两个三角形, 在重心处不断细分.
use crate::error::{Result, TbError};
use log::warn;
use ndarray::{Array1, Array2, Axis, arr1, arr2};

/// Smallest (doubled) triangle area still subdivided.
const MIN_AREA: f64 = 1e-8;
const MIN_LENGTH: f64 = 1e-8;

#[allow(non_snake_case)]
pub fn adapted_integrate_quick(
    f0: &dyn Fn(&Array1<f64>) -> Result<f64>,
    k_range: &Array2<f64>,
    re_err: f64,
    ab_err: f64,
) -> Result<f64> {
    //! 对 `k_range` 给出的区域 (每一行是一个方向的 [起点, 终点]) 做自适应积分.
    //!
    //! 达到最小尺寸还没收敛的时候返回当前的估计值, 同时打一条 warn.
    let dim = k_range.len_of(Axis(0));
    match dim {
        1 => {
            //线性插值的梯形公式 (a+b)*h/2, 误差用对分前后的差来估计.
            let mut use_range = vec![(k_range[[0, 0]], k_range[[0, 1]], ab_err)];
            let mut result = 0.0;
            let mut floor_hit = false;
            while let Some((a, b, ab_err)) = use_range.pop() {
                let m = (a + b) / 2.0;
                let dk = b - a;
                let y_l = f0(&arr1(&[a]))?;
                let y_r = f0(&arr1(&[b]))?;
                let y_m = f0(&arr1(&[m]))?;
                let all = (y_l + y_r) * dk / 2.0;
                let all_new = (y_l + 2.0 * y_m + y_r) * dk / 4.0;
                let abs_err = ab_err.max(all.abs() * re_err);
                if (all_new - all).abs() > abs_err && dk > MIN_LENGTH {
                    use_range.push((a, m, ab_err / 2.0));
                    use_range.push((m, b, ab_err / 2.0));
                } else {
                    floor_hit |= dk <= MIN_LENGTH;
                    result += all_new;
                }
            }
            if floor_hit {
                warn!("adaptive integration reached the minimal interval before converging");
            }
            Ok(result)
        }
        2 => {
            //二维情况假设三角形上线性插值, 每个三角形的积分是 (s1+s2+s3)*S/6, S 是三角形面积的两倍.
            let (x0, x1) = (k_range[[0, 0]], k_range[[0, 1]]);
            let (y0, y1) = (k_range[[1, 0]], k_range[[1, 1]]);
            let area_1 = arr2(&[[x0, y0], [x1, y0], [x0, y1]]);
            let area_2 = arr2(&[[x1, y1], [x1, y0], [x0, y1]]);
            let S = (x1 - x0) * (y1 - y0);
            let s1 = f0(&arr1(&[x0, y0]))?;
            let s2 = f0(&arr1(&[x1, y0]))?;
            let s3 = f0(&arr1(&[x0, y1]))?;
            let s4 = f0(&arr1(&[x1, y1]))?;
            let all_1 =
                adapt_integrate_triangle(f0, &area_1, re_err, ab_err / 2.0, [s1, s2, s3], S)?;
            let all_2 =
                adapt_integrate_triangle(f0, &area_2, re_err, ab_err / 2.0, [s4, s2, s3], S)?;
            Ok(all_1 + all_2)
        }
        _ => Err(TbError::InvalidDimension {
            dim,
            supported: vec![1, 2],
        }),
    }
}

#[allow(non_snake_case)]
#[inline(always)]
fn adapt_integrate_triangle(
    f0: &dyn Fn(&Array1<f64>) -> Result<f64>,
    kvec: &Array2<f64>,
    re_err: f64,
    ab_err: f64,
    s: [f64; 3],
    S: f64,
) -> Result<f64> {
    let mut result = 0.0;
    let mut floor_hit = false;
    let mut use_kvec = vec![(kvec.clone(), ab_err, s, S)];
    while let Some((kvec, ab_err, [s1, s2, s3], S)) = use_kvec.pop() {
        let kvec_m = kvec.sum_axis(Axis(0)) / 3.0;
        let sm = f0(&kvec_m)?;
        let all = (s1 + s2 + s3) * S / 6.0;
        let all_new = all / 3.0 * 2.0 + sm * S / 6.0;
        let abs_err = ab_err.max(all.abs() * re_err);
        if (all_new - all).abs() > abs_err && S > MIN_AREA {
            let mut new_kvec = kvec.to_owned();
            // 三个顶点加上重心, 重心的下标是 3
            if new_kvec.push_row(kvec_m.view()).is_err() {
                result += all_new;
                continue;
            }
            let S1 = S / 3.0;
            use_kvec.push((new_kvec.select(Axis(0), &[0, 1, 3]), ab_err / 3.0, [s1, s2, sm], S1));
            use_kvec.push((new_kvec.select(Axis(0), &[0, 3, 2]), ab_err / 3.0, [s1, sm, s3], S1));
            use_kvec.push((new_kvec.select(Axis(0), &[3, 1, 2]), ab_err / 3.0, [sm, s2, s3], S1));
        } else {
            floor_hit |= S <= MIN_AREA;
            result += all_new;
        }
    }
    if floor_hit {
        warn!("adaptive integration reached the minimal triangle before converging");
    }
    Ok(result)
}
